mod common;
mod import_tests;
mod scenario_tests;
mod system_tests;

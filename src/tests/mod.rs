pub mod verify_tests;
pub mod scenario_tests;

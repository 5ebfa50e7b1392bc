//! Integration tests for the plugin runtime.

mod helpers;

mod composition_test;
mod hooks_test;
mod lifecycle_test;
mod services_test;
mod state_machine_test;

//! Shared proptest strategies for schema tests.

use proptest::prelude::*;

/// Strategy for generating identifier-like names.
pub fn arb_name() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,19}"
}

/// Strategy for generating Go source file paths.
pub fn arb_file() -> impl Strategy<Value = String> {
    (arb_name(), arb_name()).prop_map(|(dir, file)| format!("/src/{dir}/{file}.go"))
}

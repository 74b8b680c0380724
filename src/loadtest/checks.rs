//! Named response assertions.
//!
//! A check never stops an iteration. It only produces a [`CheckOutcome`]
//! that the metrics pipeline tallies by name.

use crate::loadtest::client::RequestOutcome;

/// Check name for the moderator login.
pub const DUMMY_LOGIN: &str = "dummyLogin 200";
/// Check name for the employee login.
pub const DUMMY_LOGIN_EMPLOYEE: &str = "dummyLogin employee 200";
/// Check name for pickup point creation.
pub const CREATE_PVZ: &str = "CreatePVZ 201";
/// Check name for adding a product.
pub const ADD_PRODUCT: &str = "AddProduct 201";
/// Check name for opening a reception.
pub const CREATE_RECEPTION: &str = "CreateReception 200";
/// Check name for removing the last product of a reception.
pub const DELETE_LAST_PRODUCT: &str = "DeleteLastProduct 200";
/// Check name for closing a reception.
pub const CLOSE_RECEPTION: &str = "CloseReception 200";
/// Check name for listing pickup points.
pub const LIST_PVZ: &str = "ListPVZ 200";

/// Result of one named assertion against a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOutcome {
    /// Check name; results are aggregated under it.
    pub name: &'static str,
    /// Whether the assertion held.
    pub passed: bool,
}

impl CheckOutcome {
    /// Creates an outcome.
    pub fn new(name: &'static str, passed: bool) -> Self {
        Self { name, passed }
    }
}

/// Passes when a response arrived with exactly `status`.
///
/// A transport failure has no status and always fails.
pub fn status_is(name: &'static str, outcome: &RequestOutcome, status: u16) -> CheckOutcome {
    CheckOutcome::new(name, outcome.status() == Some(status))
}

/// Passes when the status matches and the JSON body's `field` equals
/// `expected` exactly.
pub fn status_and_field(
    name: &'static str,
    outcome: &RequestOutcome,
    status: u16,
    field: &str,
    expected: &str,
) -> CheckOutcome {
    let passed = outcome.status() == Some(status) && outcome.json_str(field) == Some(expected);
    CheckOutcome::new(name, passed)
}

/// Like [`status_and_field`] but compares the field ignoring ASCII case.
pub fn status_and_field_ignore_case(
    name: &'static str,
    outcome: &RequestOutcome,
    status: u16,
    field: &str,
    expected: &str,
) -> CheckOutcome {
    let passed = outcome.status() == Some(status)
        && outcome
            .json_str(field)
            .is_some_and(|v| v.eq_ignore_ascii_case(expected));
    CheckOutcome::new(name, passed)
}

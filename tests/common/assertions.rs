//! Custom assertion macros and utilities
//!
//! Provides enhanced assertion macros for better test output and
//! more descriptive error messages.

/// Assert that a result is ok and return the value
///
/// This macro unwraps a Result, providing a better error message
/// if the result is an error.
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $message:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $message, e),
        }
    };
}

/// Assert that a store result failed with a given consistency violation
#[macro_export]
macro_rules! assert_violation {
    ($result:expr, $pattern:pat) => {
        match $result {
            Err(chatmirror::shared::StoreError::Consistency($pattern)) => {}
            Ok(value) => panic!("Expected violation, got Ok: {:?}", value),
            Err(e) => panic!("Expected different error, got: {:?}", e),
        }
    };
}

/// Assert that the chatroom ids in a collection are exactly the given ones
#[macro_export]
macro_rules! assert_room_ids {
    ($ids:expr, [$($id:expr),* $(,)?]) => {
        let actual: Vec<String> = $ids.into_iter().map(|id| id.to_string()).collect();
        let expected: Vec<String> = vec![$($id.to_string()),*];
        pretty_assertions::assert_eq!(actual, expected, "chatroom ids differ");
    };
}

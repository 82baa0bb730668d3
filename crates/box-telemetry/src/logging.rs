//! Structured log helpers.
//!
//! Every box log line carries the same field names so that lines about one
//! box or one event can be grepped or queried together:
//! - `box_id`: box the line is about
//! - `event_id`: event the line is about
//! - `identity_id`: acting or targeted identity
//! - `step`: post-commit side effect name

/// Log a box event with standard fields.
///
/// ```rust,ignore
/// log_box_event!(info, "Event created", box_id, event_id, event_type = %t);
/// ```
#[macro_export]
macro_rules! log_box_event {
    ($level:ident, $msg:expr, $box_id:expr, $event_id:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            box_id = %$box_id,
            event_id = %$event_id,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a post-commit side effect outcome with standard fields.
#[macro_export]
macro_rules! log_step_event {
    ($level:ident, $msg:expr, $box_id:expr, $event_id:expr, $step:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            box_id = %$box_id,
            event_id = %$event_id,
            step = %$step,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log an identity-related line with standard fields.
#[macro_export]
macro_rules! log_identity_event {
    ($level:ident, $msg:expr, $box_id:expr, $identity_id:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            box_id = %$box_id,
            identity_id = %$identity_id,
            $($($field)*,)?
            $msg
        )
    };
}

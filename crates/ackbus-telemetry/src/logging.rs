//! Structured log helpers.
//!
//! Per-envelope log lines always carry the same fields so they can be
//! grepped or queried together:
//! - `topic`: topic the envelope lives on
//! - `envelope_id`: envelope identifier
//! - `identity`: subscriber identity doing the work

/// Log a per-envelope event with the standard delivery fields.
///
/// ```ignore
/// log_delivery!(debug, "Envelope acked", topic, envelope.id, identity);
/// log_delivery!(warn, "Ack failed", topic, envelope.id, identity, error = %e);
/// ```
#[macro_export]
macro_rules! log_delivery {
    ($level:ident, $msg:expr, $topic:expr, $envelope_id:expr, $identity:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            topic = %$topic,
            envelope_id = %$envelope_id,
            identity = %$identity,
            $($($field)*,)?
            $msg
        )
    };
}

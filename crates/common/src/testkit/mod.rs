/// In-process stand-ins for the relay's network collaborators
///
/// These let the encrypted cloud transport run end to end inside a test,
/// with the test playing the part of the remote session.
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::{MemoryRelay, StaticDirectory};
///
/// #[tokio::test]
/// async fn test_reply() {
///     let (relay, connector) = MemoryRelay::new();
///     let directory = StaticDirectory::new();
///     // ... build a CloudTransport from `connector` and `directory`,
///     // read what it emits with `relay.next_emit()` and answer with
///     // `relay.push_update(...)`.
/// }
/// ```
mod directory;
mod relay;

pub use directory::{session_record, StaticDirectory};
pub use relay::{encrypted_update, MemoryConnector, MemoryRelay};

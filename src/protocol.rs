use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// A message sent from an isolated execution context back to the bridge.
///
/// `Published` carries a progress event, zero or more per execution, in
/// emission order. `Completed` carries the final value and is the last
/// in-band message an execution ever sends. Unhandled faults do not travel
/// on this channel; the boundary reports them out-of-band.
#[derive(Debug)]
pub(crate) enum Message {
    Published(Value),
    Completed(Value),
}

/// Immutable snapshot of the caller's arguments, taken before spawning.
///
/// The snapshot is the only argument state that crosses the isolation
/// boundary: a serialized byte copy, so the context can never observe
/// later mutation by the caller. `encoded` is `None` when the arguments
/// could not be serialized; the payload then falls back to the raw value
/// it carried along.
#[derive(Debug, Clone)]
pub(crate) struct ArgsSnapshot {
    encoded: Option<Bytes>,
}

impl ArgsSnapshot {
    /// Serialize `args` into a snapshot. Serialization failure is not a
    /// hard error: the payload keeps the raw value as a fallback.
    pub(crate) fn capture<A: Serialize>(args: &A) -> Self {
        let encoded = match serde_json::to_vec(args) {
            Ok(buf) => Some(Bytes::from(buf)),
            Err(e) => {
                warn!(error = %e, "arguments are not serializable, passing raw value through");
                None
            }
        };
        Self { encoded }
    }

    /// Decode the snapshot back into `A`, falling back to `fallback` when
    /// the snapshot is missing or does not decode.
    pub(crate) fn decode_or<A: DeserializeOwned>(&self, fallback: A) -> A {
        match &self.encoded {
            Some(bytes) => match serde_json::from_slice(bytes) {
                Ok(args) => args,
                Err(e) => {
                    warn!(error = %e, "argument snapshot did not decode, using raw value");
                    fallback
                }
            },
            None => fallback,
        }
    }
}

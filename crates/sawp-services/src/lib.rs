//! sawp-services: the two protocol endpoints and the transport they run on.
//!
//! [`sender`] and [`receiver`] each pair a sans-I/O session state machine
//! with an async loop that drives it over any [`transport::Datagram`].
//! [`sim`] provides an in-memory network with scripted faults for tests.

pub mod receiver;
pub mod sender;
pub mod sim;
pub mod stats;
pub mod transport;

pub use receiver::{run_receiver, Reception, ReceiverSession};
pub use sender::{run_sender, ReplyOutcome, SenderSession, SenderState};
pub use sim::{corrupt, Fate, Fault, SimNetwork, SimSocket, TraceEntry};
pub use stats::{ReceiverStats, SendReport};
pub use transport::{bind_ephemeral, Datagram, MAX_RECV_FAILURES};

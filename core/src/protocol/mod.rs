mod client;
mod codec;
mod endpoint;
mod listener;

pub use client::propose;
pub use codec::{
    read_request, read_response, write_request, write_response, DecodedRequest, Framing,
    ProposalRequest,
};
pub use endpoint::Endpoint;
pub use listener::{BoundListener, ConnectionOutcome, ListenerOptions, ProtocolListener};

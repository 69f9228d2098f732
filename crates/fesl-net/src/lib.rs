//! FESL backend networking: packet codec, ticket decoding, shared identity
//! allocation, transaction routing, and the per-connection session loop.

pub mod identity;
pub mod packet;
pub mod routing;
pub mod session;
pub mod tcp_server;
pub mod ticket;
pub mod transport;
pub mod value;

pub use identity::SharedIdentity;
pub use packet::{EncodeError, MalformedPacket, Packet, PacketType, TransmissionType};
pub use routing::{
    Dispatch, HandlerContext, HandlerError, HandlerResult, ServiceSettings, TransactionHandler,
    TransactionRouter,
};
pub use session::{CloseReason, Session, SessionEngine, SessionState};
pub use tcp_server::{ConnectionId, ConnectionMap, FeslServer, IdGenerator, ServerConfig};
pub use ticket::{Ticket, TicketError, TicketKind, TicketRecord, TicketValue};
pub use transport::{FrameConfig, StreamTransport, Transport, TransportError};
pub use value::{FieldValue, PacketRecord};

pub mod dom;
pub mod error;
pub mod protocol;

pub use dom::{DomNode, ElementPath, Rect};
pub use error::ProtocolError;
pub use protocol::{
    DockCorner, DockSize, ElementKey, ElementMeta, Interaction, InteractionKind, NetworkRequest,
    TabId, TabSnapshot,
};

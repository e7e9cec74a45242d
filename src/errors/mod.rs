pub mod call_error;

pub use call_error::{
    CollaboratorError, ContextRetrievalError, TransportError, TurnFailure, TurnStage,
};

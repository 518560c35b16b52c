use std::{borrow::Cow, fmt::Display};

use crate::transport::streamable_http_server::session::SessionError;
pub use crate::model::ErrorData;

impl Display for ErrorData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.0, self.message)?;
        if let Some(data) = &self.data {
            write!(f, "({})", data)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorData {}

/// Everything that can go wrong while the router dispatches one HTTP call.
///
/// None of these reach the client verbatim: the dispatcher logs them and
/// answers with a generic internal error.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("Transport creation error: {error}")]
    TransportCreation {
        into_transport_type_name: Cow<'static, str>,
        into_transport_type_id: std::any::TypeId,
        #[source]
        error: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Transport error {error}, when {context}")]
    Transport {
        transport_type_name: Cow<'static, str>,
        context: Cow<'static, str>,
        #[source]
        error: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl RouterError {
    pub fn transport_creation<T: 'static>(
        error: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        RouterError::TransportCreation {
            into_transport_type_id: std::any::TypeId::of::<T>(),
            into_transport_type_name: std::any::type_name::<T>().into(),
            error: error.into(),
        }
    }

    pub fn transport<T: 'static>(
        error: impl Into<Box<dyn std::error::Error + Send + Sync>>,
        context: impl Into<Cow<'static, str>>,
    ) -> Self {
        RouterError::Transport {
            transport_type_name: std::any::type_name::<T>().into(),
            context: context.into(),
            error: error.into(),
        }
    }
}

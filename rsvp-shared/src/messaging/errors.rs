//! # Messaging Error Types
//!
//! Structured error handling for the bus layer using thiserror instead of
//! `Box<dyn Error>` patterns.

use thiserror::Error;

/// Bus-layer error taxonomy.
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Topology declaration failed: {name}: {message}")]
    TopologyDeclaration { name: String, message: String },

    #[error("Publish failed: {exchange}/{routing_key}: {message}")]
    Publish {
        exchange: String,
        routing_key: String,
        message: String,
    },

    #[error("Consume failed: {queue}: {message}")]
    Consume { queue: String, message: String },

    #[error("Acknowledgement failed: {message}")]
    Acknowledge { message: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },
}

impl MessagingError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn topology(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TopologyDeclaration {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn publish(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Publish {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            message: message.into(),
        }
    }

    pub fn consume(queue: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Consume {
            queue: queue.into(),
            message: message.into(),
        }
    }

    pub fn acknowledge(message: impl Into<String>) -> Self {
        Self::Acknowledge {
            message: message.into(),
        }
    }

    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    pub fn message_deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }

    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }
}

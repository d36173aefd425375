use crate::key_value::KeyValue;
use crate::keys::headers;

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use thiserror::Error;

/// Errors raised when stamping system headers onto a message.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    /// The message already carries an id.
    #[error("message id already assigned: {0}")]
    MessageIdAlreadyAssigned(String),

    /// The message already belongs to a transaction.
    #[error("transaction id already assigned: {0}")]
    TransactionIdAlreadyAssigned(String),
}

/// An application payload bound for a topic or queue.
///
/// `message_id` and `transaction_id` start empty and can each be assigned
/// exactly once by the sending path.
#[derive(Clone, Debug)]
pub struct Message {
    body: Bytes,
    born_timestamp: Option<u64>,
    destination: String,
    message_id: Option<String>,
    properties: KeyValue,
    transaction_id: Option<String>,
}

impl Message {
    /// Creates a message for `destination`.
    pub fn new<D, B>(destination: D, body: B) -> Self
    where
        D: Into<String>,
        B: Into<Bytes>,
    {
        Self {
            body: body.into(),
            born_timestamp: None,
            destination: destination.into(),
            message_id: None,
            properties: KeyValue::new(),
            transaction_id: None,
        }
    }

    /// Adds a user property.
    #[must_use]
    pub fn with_property<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<crate::PropertyValue>,
    {
        self.properties.put(key, value);
        self
    }

    /// The payload.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Milliseconds since the unix epoch at which the message was first sent.
    #[must_use]
    pub const fn born_timestamp(&self) -> Option<u64> {
        self.born_timestamp
    }

    /// The topic or queue name.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// The message id, empty until the first successful send.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// User properties.
    #[must_use]
    pub const fn properties(&self) -> &KeyValue {
        &self.properties
    }

    /// Mutable access to user properties.
    pub const fn properties_mut(&mut self) -> &mut KeyValue {
        &mut self.properties
    }

    /// The transaction this message was prepared under, if any.
    #[must_use]
    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    /// Sets the message id.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::MessageIdAlreadyAssigned`] if an id is already
    /// present; the existing id is kept.
    pub fn assign_message_id<I>(&mut self, id: I) -> Result<(), MessageError>
    where
        I: Into<String>,
    {
        if let Some(existing) = &self.message_id {
            return Err(MessageError::MessageIdAlreadyAssigned(existing.clone()));
        }

        self.message_id = Some(id.into());
        Ok(())
    }

    /// Sets the transaction id.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::TransactionIdAlreadyAssigned`] if an id is
    /// already present; the existing id is kept.
    pub fn assign_transaction_id<I>(&mut self, id: I) -> Result<(), MessageError>
    where
        I: Into<String>,
    {
        if let Some(existing) = &self.transaction_id {
            return Err(MessageError::TransactionIdAlreadyAssigned(existing.clone()));
        }

        self.transaction_id = Some(id.into());
        Ok(())
    }

    /// Records the send time unless one is already set.
    pub fn stamp_born_timestamp(&mut self) {
        if self.born_timestamp.is_none() {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
                .unwrap_or_default();
            self.born_timestamp = Some(millis);
        }
    }

    /// System headers currently set on the message.
    #[must_use]
    pub fn headers(&self) -> KeyValue {
        let mut system = KeyValue::new().with(headers::DESTINATION, self.destination.as_str());

        if let Some(id) = &self.message_id {
            system.put(headers::MESSAGE_ID, id.as_str());
        }
        if let Some(id) = &self.transaction_id {
            system.put(headers::TRANSACTION_ID, id.as_str());
        }
        if let Some(millis) = self.born_timestamp {
            system.put(headers::BORN_TIMESTAMP, i64::try_from(millis).unwrap_or(i64::MAX));
        }

        system
    }
}

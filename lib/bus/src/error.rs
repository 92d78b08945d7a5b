// SPDX-FileCopyrightText: Copyright (c) 2026 the sitebus authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Sitebus error system.
//!
//! This module provides a standardized error type for the messaging core with
//! support for:
//! - Categorized error types via the [`ErrorType`] enum
//! - Error chaining via the standard [`std::error::Error::source()`] method
//! - Serialization via serde, so dispatch failures can travel in reports
//!
//! [`BusError`] can be created directly or converted from any
//! [`std::error::Error`]:
//!
//! ```rust,ignore
//! use sitebus::error::{BusError, ErrorType};
//!
//! // Simple categorized error
//! let err = BusError::configuration("unknown transport 'jgroups'");
//!
//! // Typed error with cause
//! let cause = std::io::Error::other("connection reset");
//! let err = BusError::new(ErrorType::Transport, "send failed", Some(cause));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorizes errors into a fixed set of standard types.
///
/// Consumers (the inbound loop, the bootstrap facade) inspect the error type
/// to decide what action to take: configuration errors abort a bootstrap
/// attempt, deserialization errors drop the offending message, dispatch
/// errors abort the remaining handlers for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorType {
    /// Invalid or unknown configuration, or a failure while building and
    /// wiring components at bootstrap.
    Configuration,
    /// A business-rule failure raised by an event's `perform` or a handler.
    Business,
    /// A failed transmission attempt on the concrete transport.
    Transport,
    /// Failure while encoding an event for transmission.
    Serialization,
    /// I/O or decoding failure while reconstructing an inbound event.
    Deserialization,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorType::Configuration => write!(f, "Configuration"),
            ErrorType::Business => write!(f, "Business"),
            ErrorType::Transport => write!(f, "Transport"),
            ErrorType::Serialization => write!(f, "Serialization"),
            ErrorType::Deserialization => write!(f, "Deserialization"),
        }
    }
}

/// The standardized error type for the messaging core.
///
/// `BusError` is a serializable, chainable error that carries an
/// [`ErrorType`] for categorization and supports error chaining via
/// [`std::error::Error::source()`].
///
/// `Display` shows only the current error (standard Rust convention); use
/// `source()` to walk the cause chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusError {
    error_type: ErrorType,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    caused_by: Option<Box<BusError>>,
}

impl BusError {
    /// Create a new `BusError` with the given type, message, and optional cause.
    ///
    /// If the cause is a `BusError`, it is preserved as-is. Otherwise, it is
    /// converted with its display string as the message.
    pub fn new(
        error_type: ErrorType,
        message: impl Into<String>,
        cause: Option<impl std::error::Error + 'static>,
    ) -> Self {
        Self {
            error_type,
            message: message.into(),
            caused_by: cause
                .map(|e| Box::new(BusError::from(&e as &(dyn std::error::Error + 'static)))),
        }
    }

    /// Shorthand for a [`ErrorType::Configuration`] error with no cause.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::uncaused(ErrorType::Configuration, message)
    }

    /// Shorthand for a [`ErrorType::Business`] error with no cause.
    pub fn business(message: impl Into<String>) -> Self {
        Self::uncaused(ErrorType::Business, message)
    }

    /// Shorthand for a [`ErrorType::Transport`] error with no cause.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::uncaused(ErrorType::Transport, message)
    }

    /// Shorthand for a [`ErrorType::Serialization`] error with no cause.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::uncaused(ErrorType::Serialization, message)
    }

    /// Shorthand for a [`ErrorType::Deserialization`] error with no cause.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::uncaused(ErrorType::Deserialization, message)
    }

    fn uncaused(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            caused_by: None,
        }
    }

    /// Returns the error type.
    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

impl std::error::Error for BusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.caused_by
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Convert from a reference to any `std::error::Error`.
///
/// If the error is already a `BusError`, it is cloned. Otherwise, it is
/// wrapped as [`ErrorType::Business`] with the display string as the message.
/// The source chain is recursively converted, preserving `BusError`
/// instances found along the way.
impl<'a> From<&'a (dyn std::error::Error + 'static)> for BusError {
    fn from(err: &'a (dyn std::error::Error + 'static)) -> Self {
        if let Some(bus_err) = err.downcast_ref::<BusError>() {
            return bus_err.clone();
        }

        Self {
            error_type: ErrorType::Business,
            message: err.to_string(),
            caused_by: err.source().map(|s| Box::new(BusError::from(s))),
        }
    }
}

/// Convert from an owned boxed `std::error::Error`.
///
/// If the error is already a `BusError`, ownership is taken without cloning.
impl From<Box<dyn std::error::Error + 'static>> for BusError {
    fn from(err: Box<dyn std::error::Error + 'static>) -> Self {
        match err.downcast::<BusError>() {
            Ok(bus_err) => *bus_err,
            Err(err) => BusError::from(&*err as &(dyn std::error::Error + 'static)),
        }
    }
}

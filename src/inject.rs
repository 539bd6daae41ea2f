//! Table injection into a destination template.
//!
//! Each destination engine stores its tables at fixed offsets inside a stock
//! player binary. The injector overwrites those ranges with converted bytes,
//! refusing any write that would run past the template. Failures are
//! returned as values and leave the template untouched.

use crate::engines::EngineVariant;
use crate::types::TableRole;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// A completed write into the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionPoint {
    /// Role written
    pub role: TableRole,
    /// Template offset
    pub offset: usize,
    /// Bytes written
    pub length: usize,
    /// Payload was clamped to a caller-supplied length
    pub truncated: bool,
}

/// Why an injection was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InjectionFailureKind {
    /// The active engine has no slot for the role
    UnknownRole,
    /// The write would run past the template
    OutOfBounds {
        /// Template offset of the role
        offset: usize,
        /// Bytes that would have been written
        len: usize,
        /// Template length
        template_len: usize,
    },
}

/// A refused injection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionFailure {
    /// Role that could not be written
    pub role: TableRole,
    /// Reason
    pub kind: InjectionFailureKind,
}

impl fmt::Display for InjectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            InjectionFailureKind::UnknownRole => {
                write!(f, "{}: no slot in the destination engine", self.role)
            }
            InjectionFailureKind::OutOfBounds {
                offset,
                len,
                template_len,
            } => write!(
                f,
                "{}: {len} bytes at offset ${offset:04X} exceed template of {template_len} bytes",
                self.role
            ),
        }
    }
}

/// Aggregate outcome of [`TableInjector::inject_multiple`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionSummary {
    /// Tables written
    pub succeeded: usize,
    /// Tables refused
    pub failed: usize,
    /// Every refusal, in role order
    pub failures: Vec<InjectionFailure>,
}

impl InjectionSummary {
    /// Tables attempted.
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Share of attempted tables that were written (1.0 when none were attempted).
    pub fn success_ratio(&self) -> f64 {
        match self.attempted() {
            0 => 1.0,
            n => self.succeeded as f64 / n as f64,
        }
    }
}

/// Writes converted tables into a template buffer.
#[derive(Debug, Clone)]
pub struct TableInjector {
    template: Vec<u8>,
    engine: EngineVariant,
    points: Vec<InjectionPoint>,
}

impl TableInjector {
    /// Wrap a template for the given engine.
    pub fn new(template: Vec<u8>, engine: EngineVariant) -> Self {
        Self {
            template,
            engine,
            points: Vec::new(),
        }
    }

    /// Active engine.
    pub fn engine(&self) -> EngineVariant {
        self.engine
    }

    /// Current template contents.
    pub fn bytes(&self) -> &[u8] {
        &self.template
    }

    /// Completed writes, in order.
    pub fn points(&self) -> &[InjectionPoint] {
        &self.points
    }

    /// Consume the injector and return the template.
    pub fn into_bytes(self) -> Vec<u8> {
        self.template
    }

    /// Write `bytes` at the engine's offset for `role`.
    pub fn inject(
        &mut self,
        role: TableRole,
        bytes: &[u8],
    ) -> Result<InjectionPoint, InjectionFailure> {
        self.write(role, bytes, false)
    }

    /// Write at most `max_len` bytes of `bytes` for `role`.
    ///
    /// The clamped write must still fit in the template.
    pub fn inject_truncated(
        &mut self,
        role: TableRole,
        bytes: &[u8],
        max_len: usize,
    ) -> Result<InjectionPoint, InjectionFailure> {
        let len = bytes.len().min(max_len);
        self.write(role, &bytes[..len], len < bytes.len())
    }

    /// Inject every table, continuing past failures.
    pub fn inject_multiple(&mut self, tables: &BTreeMap<TableRole, Vec<u8>>) -> InjectionSummary {
        let mut summary = InjectionSummary::default();
        for (&role, bytes) in tables {
            match self.inject(role, bytes) {
                Ok(_) => summary.succeeded += 1,
                Err(failure) => {
                    summary.failed += 1;
                    summary.failures.push(failure);
                }
            }
        }
        summary
    }

    fn write(
        &mut self,
        role: TableRole,
        bytes: &[u8],
        truncated: bool,
    ) -> Result<InjectionPoint, InjectionFailure> {
        let Some(offset) = self.engine.offset(role) else {
            let failure = InjectionFailure {
                role,
                kind: InjectionFailureKind::UnknownRole,
            };
            warn!(%failure, "injection refused");
            return Err(failure);
        };

        let template_len = self.template.len();
        let end = offset.checked_add(bytes.len());
        let Some(target) = end.and_then(|end| self.template.get_mut(offset..end)) else {
            let failure = InjectionFailure {
                role,
                kind: InjectionFailureKind::OutOfBounds {
                    offset,
                    len: bytes.len(),
                    template_len,
                },
            };
            warn!(%failure, "injection refused");
            return Err(failure);
        };

        target.copy_from_slice(bytes);
        let point = InjectionPoint {
            role,
            offset,
            length: bytes.len(),
            truncated,
        };
        debug!(role = %role, offset, length = bytes.len(), truncated, "table injected");
        self.points.push(point.clone());
        Ok(point)
    }
}

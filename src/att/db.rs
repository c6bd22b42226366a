// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Attribute database interface (§3, §4.2) and a static in-memory reference
//! implementation used by the demo binary and tests. The real backing store
//! (a GATT server's attribute table) is an external collaborator per §1;
//! this module only specifies, and minimally satisfies, the contract the
//! dispatcher consumes.

use std::sync::Arc;

use anyhow::{Result, ensure};
use bytes::Bytes;

use crate::{att::handle::{Handle, HandleRange}, error::AttErrorCode, uuid::Uuid};

/// What a dynamic attribute is being asked to do (§6's `HandleATT`).
#[derive(Debug)]
pub enum AttOperation<'a> {
    /// Produce a value. `offset` is non-zero only for Read Blob (§4.3).
    Read { offset: u16 },
    /// Accept a written value.
    Write { value: &'a [u8] },
}

/// A bounded writer handed to dynamic handlers (§9 "ResponseWriter
/// capping"). Writes beyond the cap are silently truncated, matching the
/// codec's own truncation discipline rather than erroring.
pub struct ResponseWriter<'a> {
    buf: &'a mut Vec<u8>,
    cap: usize,
    truncated: bool,
}

impl<'a> ResponseWriter<'a> {
    pub fn new(buf: &'a mut Vec<u8>, cap: usize) -> Self {
        buf.clear();
        Self { buf, cap, truncated: false }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.cap.saturating_sub(self.buf.len())
    }

    /// Append as much of `data` as fits under the cap; excess is dropped.
    pub fn write(&mut self, data: &[u8]) {
        let n = data.len().min(self.remaining());
        if n < data.len() {
            self.truncated = true;
        }
        self.buf.extend_from_slice(&data[..n]);
    }

    /// Whether any call to `write` had to drop bytes to stay under the cap.
    /// Find By Type Value (§4.3) treats this the same as a handler error.
    #[inline]
    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    #[inline]
    pub fn written(self) -> &'a [u8] {
        self.buf.as_slice()
    }
}

/// An upper-layer callback invoked for dynamic attributes.
pub trait AttributeHandler: Send + Sync {
    fn handle(
        &self,
        op: AttOperation<'_>,
        out: &mut ResponseWriter<'_>,
    ) -> Result<(), AttErrorCode>;
}

/// Either arm of §9's dynamic-vs-static recommendation: a tagged variant
/// replaces the "`Value()` returns nil" sentinel from the source design.
#[derive(Clone)]
pub enum AttributeValue {
    Static(Bytes),
    Dynamic(Arc<dyn AttributeHandler>),
}

impl AttributeValue {
    #[inline]
    pub fn as_static(&self) -> Option<&Bytes> {
        match self {
            Self::Static(b) => Some(b),
            Self::Dynamic(_) => None,
        }
    }
}

impl std::fmt::Debug for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(b) => f.debug_tuple("Static").field(b).finish(),
            Self::Dynamic(_) => f.debug_tuple("Dynamic").field(&"<handler>").finish(),
        }
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Static(a), Self::Static(b)) => a == b,
            (Self::Dynamic(a), Self::Dynamic(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// One entry in the attribute database (§3).
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub handle: Handle,
    pub ending_handle: Handle,
    pub type_: Uuid,
    pub value: AttributeValue,
}

impl Attribute {
    /// Construct a static attribute whose ending handle equals its handle
    /// (the common case: only group declarations span a wider range).
    pub fn static_value(handle: Handle, type_: Uuid, value: impl Into<Bytes>) -> Self {
        Self {
            handle,
            ending_handle: handle,
            type_,
            value: AttributeValue::Static(value.into()),
        }
    }

    /// Construct a static group declaration whose range covers
    /// `[handle, ending_handle]`.
    pub fn static_group(
        handle: Handle,
        ending_handle: Handle,
        type_: Uuid,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            handle,
            ending_handle,
            type_,
            value: AttributeValue::Static(value.into()),
        }
    }

    pub fn dynamic(
        handle: Handle,
        type_: Uuid,
        handler: Arc<dyn AttributeHandler>,
    ) -> Self {
        Self {
            handle,
            ending_handle: handle,
            type_,
            value: AttributeValue::Dynamic(handler),
        }
    }
}

/// The contract the dispatcher consumes (§4.2, §6): read-only, point
/// lookup plus ascending-order range enumeration.
pub trait AttributeDatabase: Send + Sync {
    fn at(&self, handle: Handle) -> Option<&Attribute>;

    /// All attributes whose handle falls in `range`, in ascending handle
    /// order.
    fn subrange<'a>(&'a self, range: HandleRange) -> Box<dyn Iterator<Item = &'a Attribute> + 'a>;
}

/// A `Vec`-backed, construction-time-validated attribute database.
///
/// Not part of the ATT protocol core itself - this exists so the crate is
/// runnable and testable without a real GATT server attached, the same way
/// `main.rs` is built against a concrete `Config` rather than only trait
/// definitions.
pub struct StaticDatabase {
    attributes: Vec<Attribute>,
}

impl StaticDatabase {
    /// Validates the invariants from §3 (unique non-zero handles,
    /// `ending_handle >= handle`) and sorts by handle.
    pub fn new(mut attributes: Vec<Attribute>) -> Result<Self> {
        attributes.sort_by_key(|a| a.handle);

        let mut prev: Option<Handle> = None;
        for attr in &attributes {
            ensure!(attr.handle != 0, "attribute handle 0 is reserved");
            ensure!(
                attr.ending_handle >= attr.handle,
                "ending_handle must be >= handle (handle=0x{:04x})",
                attr.handle
            );
            if let Some(p) = prev {
                ensure!(
                    attr.handle != p,
                    "duplicate attribute handle 0x{:04x}",
                    attr.handle
                );
            }
            prev = Some(attr.handle);
        }

        Ok(Self { attributes })
    }
}

impl AttributeDatabase for StaticDatabase {
    fn at(&self, handle: Handle) -> Option<&Attribute> {
        self.attributes
            .binary_search_by_key(&handle, |a| a.handle)
            .ok()
            .map(|idx| &self.attributes[idx])
    }

    fn subrange<'a>(&'a self, range: HandleRange) -> Box<dyn Iterator<Item = &'a Attribute> + 'a> {
        Box::new(
            self.attributes
                .iter()
                .filter(move |a| range.contains(a.handle)),
        )
    }
}

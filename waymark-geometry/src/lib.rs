//! Geometry construction for Waymark destination tables.
//!
//! This crate provides [`GeoBuilder`], the default implementation of the
//! [`GeometryBuilder`](waymark_core::GeometryBuilder) trait. A builder is
//! bound to one [`TableKind`](waymark_core::TableKind) which fixes the
//! feature kinds it is interested in and the shapes it accepts:
//!
//! - point tables build `Point` geometries from nodes;
//! - line tables build `LineString`s from ways and merge route relation
//!   members into line strings;
//! - polygon tables build `Polygon`s from closed ways and assemble
//!   multipolygon relations from `outer`/`inner` member rings.
//!
//! Builders hold no mutable state and are shared between output processor
//! clones.

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod builder;
mod rings;

pub use builder::GeoBuilder;

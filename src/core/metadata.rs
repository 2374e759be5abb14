//! Purpose: Policy for the Kotlin `@Metadata` annotation on emitted classes.
//! Exports: `KOTLIN_METADATA_DESC`, `keep_metadata`, `strip`.
//! Role: Decides whether Kotlin's class metadata survives member filtering.
//! Invariants: `@Metadata` is stripped whenever members were dropped, because
//! the annotation embeds a serialized copy of every declaration and would no
//! longer match the emitted class. Callers can force-keep it.

use crate::core::classfile::Annotation;

pub const KOTLIN_METADATA_DESC: &str = "Lkotlin/Metadata;";

/// Whether an emitted class may carry `@Metadata` forward.
pub fn keep_metadata(members_dropped: bool, keep_requested: bool) -> bool {
    keep_requested || !members_dropped
}

/// Removes `@Metadata` from `annotations`; reports whether anything changed.
pub fn strip(annotations: &mut Vec<Annotation>) -> bool {
    let before = annotations.len();
    annotations.retain(|annotation| annotation.type_desc != KOTLIN_METADATA_DESC);
    annotations.len() != before
}

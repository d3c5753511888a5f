/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Canonical structured field values and value-format helpers.
//!
//! Field keys are written literally at each call site (`url`, `client_id`,
//! `err`, `code`, `reason`, ...); this module owns the values shared between
//! call sites.

pub const NONE: &str = "none";
pub const REASON_NO_LISTENER: &str = "no_listener";
pub const REASON_ENTRY_ABSENT: &str = "entry_absent";
pub const REASON_CHANNEL_DROPPED: &str = "channel_dropped";
pub const REASON_CLOSING: &str = "closing";

/// Renders a topic list for a single log field.
pub fn format_topics(topics: &[String]) -> String {
    if topics.is_empty() {
        return NONE.to_string();
    }
    topics.join(",")
}

/// Renders an optional reason code, falling back to [`NONE`].
pub fn format_code(code: Option<i32>) -> String {
    code.map(|code| code.to_string())
        .unwrap_or_else(|| NONE.to_string())
}

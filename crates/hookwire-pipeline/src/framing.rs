// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Build the framed message a session receives as a single prompt.
//!
//! The frame text is a wire contract: sessions pattern-match on the
//! `<webhook-event>` wrapper and the tool hints inside it. Do not reword
//! without versioning the contract.

/// Inputs for one framed message.
pub struct FrameInput<'a> {
    pub subscription_id: &'a str,
    pub event_id: &'a str,
    pub service_tag: Option<&'a str>,
    pub prompt: Option<&'a str>,
    pub summary_text: &'a str,
}

/// Render the frame.
pub fn frame_message(input: &FrameInput<'_>) -> String {
    let service = input.service_tag.unwrap_or("webhook");
    let default_prompt = format!(
        "A {service} event was received. Review and take appropriate action."
    );
    let prompt = input.prompt.unwrap_or(&default_prompt);

    format!(
        "<webhook-event service=\"{service}\" event-id=\"{event_id}\">\n\
         {prompt}\n\
         <payload>\n\
         {summary}\n\
         </payload>\n\
         To see the full untruncated payload, use the get_event_payload tool with event_id \"{event_id}\".\n\
         If this event is too noisy, or the summary needs tuning, use update_subscription to adjust the summary_filter (jq expression) or jq_filter (to suppress unwanted events entirely) for subscription \"{subscription_id}\".\n\
         </webhook-event>",
        event_id = input.event_id,
        summary = input.summary_text,
        subscription_id = input.subscription_id,
    )
}

/// Truncate to at most `max_bytes`, backing off to a char boundary.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

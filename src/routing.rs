//! Routing policy: decide which review track a requester belongs to.
//!
//! This is a pure function of the reputation profile; all I/O happens
//! before (lookup) and after (lifecycle) it.

use crate::reputation::UserInfo;

/// Review track for a classified submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    /// The requester already holds the permission; nothing to review.
    AlreadyApproved,
    /// No usable submissions on record: every submission was ignored, or
    /// there are none at all. Reviewers need content before approving.
    NeedsContent,
    /// At least one non-ignored submission exists.
    MeetsMinimum,
}

/// Classify a profile into a track. Rules apply in priority order.
pub fn classify(info: &UserInfo) -> Track {
    if info.permissions.sponsor {
        return Track::AlreadyApproved;
    }
    if info.segment_count == 0 || info.segment_count == info.ignored_segment_count {
        return Track::NeedsContent;
    }
    Track::MeetsMinimum
}

/// Reply sent in place of the whole review flow when permission already
/// exists.
pub const ALREADY_APPROVED_REPLY: &str = "You already have permission to submit.";

/// Guidance message posted into the requester thread (or as a direct reply
/// for bridged messages), selected by track.
pub fn guidance_message(track: Track, requester_mention: &str) -> String {
    let mut body = format!(
        "Hi {requester_mention}. Thank you for your interest in contributing to SponsorBlock!\n\n"
    );

    match track {
        Track::NeedsContent => {
            body.push_str(
                "You have no submissions on record. If your message doesn't contain a link to a \
                 video and timings you want to submit, make sure you post the information \
                 **into this thread**/**edit your message if you're on Matrix!**",
            );
        }
        Track::MeetsMinimum => {
            body.push_str(
                "It looks like you already meet the minimum requirements for permission to submit.",
            );
        }
        // No guidance exists for this track; callers reply with
        // ALREADY_APPROVED_REPLY instead of routing.
        Track::AlreadyApproved => {}
    }

    body.push_str(
        "\n\nAll you need to do now is **wait for our review** and we will get back to you \
         **as soon as possible!**",
    );
    body
}

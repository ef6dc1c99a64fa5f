use cairn_types::models::{Conversation, RentalRequest, RentalStatus};

use crate::notifier::NotifyError;

/// For a new message, the recipient is the other participant — never the
/// sender.
pub fn message_recipient<'a>(
    conversation: &'a Conversation,
    sender_id: &str,
) -> Result<&'a str, NotifyError> {
    conversation
        .counterpart(sender_id)
        .ok_or_else(|| NotifyError::UnknownRecipient {
            conversation: conversation.id.clone(),
            sender: sender_id.to_string(),
        })
}

/// Who learns about a rental-status change.
///
/// `approved`/`rejected` decide the renter's request; `completed` returns the
/// owner's gear; a newly created (`pending`) request asks the owner to act.
pub fn rental_recipient(request: &RentalRequest, status: RentalStatus) -> &str {
    match status {
        RentalStatus::Approved | RentalStatus::Rejected => &request.renter_id,
        RentalStatus::Completed | RentalStatus::Pending => &request.owner_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn conversation() -> Conversation {
        Conversation {
            id: "c1".into(),
            user_1: "alice".into(),
            user_2: "bob".into(),
            gear_listing: None,
        }
    }

    fn request() -> RentalRequest {
        RentalRequest {
            id: "r1".into(),
            gear_listing: "tent-42".into(),
            renter_id: "bob".into(),
            owner_id: "alice".into(),
            start_date: Utc.with_ymd_and_hms(2026, 8, 10, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2026, 8, 12, 0, 0, 0).unwrap(),
            status: RentalStatus::Pending,
        }
    }

    #[test]
    fn message_goes_to_the_other_participant() {
        let c = conversation();
        assert_eq!(message_recipient(&c, "alice").unwrap(), "bob");
        assert_eq!(message_recipient(&c, "bob").unwrap(), "alice");
    }

    #[test]
    fn non_participant_sender_is_an_error() {
        let c = conversation();
        let err = message_recipient(&c, "mallory").unwrap_err();
        assert!(matches!(err, NotifyError::UnknownRecipient { .. }));
    }

    #[test]
    fn decisions_notify_the_renter() {
        let r = request();
        assert_eq!(rental_recipient(&r, RentalStatus::Approved), "bob");
        assert_eq!(rental_recipient(&r, RentalStatus::Rejected), "bob");
    }

    #[test]
    fn completion_notifies_the_owner() {
        let r = request();
        assert_eq!(rental_recipient(&r, RentalStatus::Completed), "alice");
    }

    #[test]
    fn new_requests_notify_the_owner() {
        let r = request();
        assert_eq!(rental_recipient(&r, RentalStatus::Pending), "alice");
    }
}

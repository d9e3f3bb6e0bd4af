//! Text of messages sent to renters and the administrator

use lessor_api::LeaseView;
use lessor_util::{AccountId, OwnerId, format_datetime_full, format_minutes};

pub(crate) fn lease_started(lease: &LeaseView) -> String {
    format!(
        "Your lease #{id} of {name} is active.\n\
         Login: {login}\n\
         Password: {secret}\n\
         Expires: {expires}\n\
         Request a guard code in this chat when you sign in.",
        id = lease.account_id,
        name = lease.inventory_name,
        login = lease.login,
        secret = lease.secret,
        expires = format_datetime_full(&lease.expires_at),
    )
}

pub(crate) fn lease_extended(lease: &LeaseView, added_hours: u32) -> String {
    format!(
        "Lease #{id} of {name} extended by {added_hours}h.\n\
         Login: {login}\n\
         Password: {secret}\n\
         Expires: {expires}",
        id = lease.account_id,
        name = lease.inventory_name,
        login = lease.login,
        secret = lease.secret,
        expires = format_datetime_full(&lease.expires_at),
    )
}

pub(crate) fn lease_released(account_id: AccountId, inventory_name: &str) -> String {
    format!("Your lease #{account_id} of {inventory_name} was ended by the seller.")
}

pub(crate) fn admin_lease_started(lease: &LeaseView) -> String {
    format!(
        "Lease #{} of {} started for {} until {}",
        lease.account_id,
        lease.inventory_name,
        lease.owner,
        format_datetime_full(&lease.expires_at)
    )
}

pub(crate) fn expiry_warning_owner(
    account_id: AccountId,
    inventory_name: &str,
    remaining: chrono::Duration,
) -> String {
    format!(
        "Your lease #{account_id} of {inventory_name} ends in {}. \
         Order again to extend it.",
        format_minutes(remaining)
    )
}

pub(crate) fn expiry_warning_admin(
    account_id: AccountId,
    owner: &OwnerId,
    remaining: chrono::Duration,
) -> String {
    format!(
        "Lease #{account_id} of {owner} ends in {}",
        format_minutes(remaining)
    )
}

pub(crate) fn lease_ended(account_id: AccountId, inventory_name: &str) -> String {
    format!(
        "Your lease #{account_id} of {inventory_name} has ended and the password was changed. \
         Thank you for renting!"
    )
}

pub(crate) fn admin_rotated(login: &str, account_id: AccountId, owner: &OwnerId) -> String {
    format!("Lease #{account_id} of {owner} expired; {login} rotated and back in stock")
}

pub(crate) fn admin_rotation_failed(login: &str, account_id: AccountId, reason: &str) -> String {
    format!(
        "Rotation of {login} (lease #{account_id}) failed: {reason}. \
         The account is quarantined until rotated manually."
    )
}

pub(crate) fn admin_rotation_unsaved(login: &str, new_secret: &str, error: &str) -> String {
    format!(
        "Secret of {login} was changed to {new_secret} but could not be saved ({error}). \
         Update the inventory by hand."
    )
}

pub(crate) fn secret_replaced(account_id: AccountId, login: &str, new_secret: &str) -> String {
    format!(
        "The password of your lease #{account_id} was changed.\n\
         Login: {login}\n\
         Password: {new_secret}"
    )
}

pub(crate) fn unavailable(inventory_name: &str) -> String {
    format!(
        "Sorry, {inventory_name} is currently unavailable. \
         An operator will contact you shortly."
    )
}

pub(crate) fn quantity_as_hours(inventory_name: &str, quantity: u32) -> String {
    format!(
        "You ordered {quantity} units of {inventory_name}; \
         they were combined into one lease of {quantity} hours."
    )
}

pub(crate) fn admin_unavailable(order_id: &str, buyer: &OwnerId, inventory_name: &str) -> String {
    format!("Order {order_id} by {buyer}: no free account for {inventory_name}")
}

pub(crate) fn admin_order_refused(order_id: &str, buyer: &OwnerId, reason: &str) -> String {
    format!("Order {order_id} by {buyer} was not leased: {reason}")
}

pub(crate) fn guard_code_line(account_id: AccountId, code: &str) -> String {
    format!("ID {account_id} -> {code}")
}

pub(crate) const NO_ACTIVE_LEASE: &str = "You have no active lease.";

pub(crate) const GUARD_CODE_UNAVAILABLE: &str =
    "Could not produce a guard code right now, please try again in a minute.";

pub(crate) const OPERATOR_ACK: &str = "An operator will answer you soon.";

pub(crate) fn admin_operator_request(author: &OwnerId) -> String {
    format!("{author} asked for an operator")
}

pub(crate) fn stock(inventory_name: &str, free: u64, total: u64) -> String {
    format!("{inventory_name}: {free} of {total} accounts free")
}

pub(crate) const STOCK_UNKNOWN: &str =
    "Open the listing you are interested in and ask again.";

pub(crate) fn feedback_credited(bonus_hours: u32, leases: usize) -> String {
    format!("Thanks for the review! {leases} lease(s) extended by {bonus_hours}h.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn guard_code_line_format() {
        assert_eq!(guard_code_line(AccountId::new(7), "R87JJ"), "ID 7 -> R87JJ");
    }

    #[test]
    fn started_notice_carries_credential_and_expiry() {
        let started_at = chrono::DateTime::parse_from_rfc3339("2025-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let lease = LeaseView {
            account_id: AccountId::new(3),
            inventory_name: "LotA".into(),
            owner: OwnerId::new("alice"),
            login: "L1".into(),
            secret: "s3cret-pw".into(),
            started_at,
            duration_hours: 2,
            expires_at: started_at + chrono::Duration::hours(2),
        };

        let text = lease_started(&lease);
        assert!(text.contains("#3"));
        assert!(text.contains("s3cret-pw"));
        assert!(text.contains("2025-01-01 12:00:00 UTC"));
    }
}

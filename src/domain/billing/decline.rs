//! Translation of gateway decline reasons into purchaser-facing messages.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// HTTP status the gateway uses for card errors.
pub const CARD_ERROR_STATUS: u16 = 402;

pub const GENERIC_FAILURE_MESSAGE: &str = "Your payment was unsuccessful. Please try again later.";

pub const UNKNOWN_DECLINE_MESSAGE: &str =
    "Your card has been declined for an unknown reason. Contact your bank for more information.";

pub const SUBSCRIPTION_LIMIT_MESSAGE: &str =
    "No more than 25 active subscriptions are allowed, please delete a subscription before adding another.";

const SUBSCRIPTION_LIMIT_MARKER: &str = "already has the maximum 25 current subscriptions";

const INCORRECT_NUMBER: &str =
    "Your card number is incorrect. Please enter the correct number and try again.";
const INCORRECT_PIN: &str = "Your pin is incorrect. Please enter the correct number and try again.";
const INVALID_ACCOUNT: &str = "Your card, or account the card is connected to, is invalid. Contact your bank for more information.";

static DECLINE_MESSAGES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("approve_with_id", "The transaction cannot be authorized. Please try again or contact your bank."),
        ("card_not_supported", "Your card does not support this type of purchase. Contact your bank for more information."),
        ("card_velocity_exceeded", "You have exceeded the balance or credit limit available on your card."),
        ("currency_not_supported", "Your card does not support the specified currency."),
        ("duplicate_transaction", "This transaction has been declined because a transaction with identical amount and credit card information was submitted very recently."),
        ("fraudulent", "This transaction has been flagged as potentially fraudulent. Contact your bank for more information."),
        ("incorrect_number", INCORRECT_NUMBER),
        ("incorrect_pin", INCORRECT_PIN),
        ("incorrect_zip", "Your ZIP/postal code is incorrect. Please enter the correct number and try again."),
        ("insufficient_funds", "Your card has insufficient funds to complete this transaction."),
        ("invalid_account", INVALID_ACCOUNT),
        ("invalid_amount", "The payment amount exceeds the amount that is allowed. Contact your bank for more information."),
        ("invalid_cvc", "Your CVC number is incorrect. Please enter the correct number and try again."),
        ("invalid_expiry_year", "The expiration year is invalid. Please enter the correct number and try again."),
        ("invalid_number", INCORRECT_NUMBER),
        ("invalid_pin", INCORRECT_PIN),
        ("issuer_not_available", "The payment cannot be authorized. Please try again or contact your bank."),
        ("new_account_information_available", INVALID_ACCOUNT),
        ("withdrawal_count_limit_exceeded", "You have exceeded the balance or credit limit on your card. Please try another payment method."),
        ("pin_try_exceeded", "The allowable number of PIN tries has been exceeded. Please try again later or use another payment method."),
        ("processing_error", "An error occurred while processing the card. Please try again."),
    ])
});

/// Message for a card decline reason. Unknown reasons get a generic decline message.
pub fn decline_message(decline_code: &str) -> &'static str {
    DECLINE_MESSAGES
        .get(decline_code)
        .copied()
        .unwrap_or(UNKNOWN_DECLINE_MESSAGE)
}

/// Purchaser-facing message for a failed gateway call.
///
/// The decline table only applies to card errors; anything else gets the
/// generic message so internal gateway wording never reaches the purchaser.
pub fn purchaser_message(
    http_status: Option<u16>,
    decline_code: Option<&str>,
    gateway_message: &str,
) -> &'static str {
    if gateway_message.contains(SUBSCRIPTION_LIMIT_MARKER) {
        return SUBSCRIPTION_LIMIT_MESSAGE;
    }
    match http_status {
        Some(CARD_ERROR_STATUS) => decline_message(decline_code.unwrap_or_default()),
        _ => GENERIC_FAILURE_MESSAGE,
    }
}

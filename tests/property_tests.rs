//! Property-based tests for pure storefront logic.
//!
//! These use proptest to check invariants across generated inputs: pagination
//! math, password policy decisions, order line arithmetic and image URLs.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::path::PathBuf;
use url::Url;
use uuid::Uuid;

use storefront_api::auth::{PasswordPolicy, PasswordPolicyError};
use storefront_api::entities::order_item;
use storefront_api::services::images::ImageStore;
use storefront_api::PaginatedResponse;

// Strategies for generating test data
fn conforming_password_strategy() -> impl Strategy<Value = String> {
    ("[a-z]{6,20}", "[A-Z]{1,4}", "[0-9]{1,4}")
        .prop_map(|(lower, upper, digits)| format!("{}{}{}", lower, upper, digits))
}

fn price_cents_strategy() -> impl Strategy<Value = i64> {
    1i64..1_000_000
}

fn order_lines_strategy() -> impl Strategy<Value = Vec<(i64, i32)>> {
    prop::collection::vec((price_cents_strategy(), 1i32..=100), 1..10)
}

fn stored_image_name_strategy() -> impl Strategy<Value = String> {
    ("[a-f0-9]{32}", prop_oneof!["png", "jpg", "jpeg", "gif", "webp"])
        .prop_map(|(stem, ext)| format!("{}.{}", stem, ext))
}

// Property: total_pages is the exact ceiling of total / limit
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn page_count_covers_every_item(total in 0u64..100_000, page in 1u64..1_000, limit in 1u64..=500) {
        let response = PaginatedResponse::<u64>::new(Vec::new(), total, page, limit);

        prop_assert_eq!(response.total, total);
        prop_assert_eq!(response.page, page);
        prop_assert_eq!(response.limit, limit);

        if total == 0 {
            prop_assert_eq!(response.total_pages, 0);
        } else {
            prop_assert!(
                response.total_pages * limit >= total,
                "{} pages of {} do not cover {} items",
                response.total_pages, limit, total
            );
            prop_assert!(
                (response.total_pages - 1) * limit < total,
                "{} pages of {} is one page too many for {} items",
                response.total_pages, limit, total
            );
        }
    }

    #[test]
    fn zero_limit_never_divides(total in 0u64..10_000) {
        let response = PaginatedResponse::<u64>::new(Vec::new(), total, 1, 0);
        prop_assert_eq!(response.total_pages, 0);
    }
}

// Property: the password policy accepts and rejects consistently
proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn conforming_passwords_are_accepted(password in conforming_password_strategy()) {
        let policy = PasswordPolicy::default();
        let violations = policy.violations(&password);
        prop_assert!(violations.is_empty(), "Conforming password rejected: {:?}", violations);
        prop_assert!(policy.validate(&password).is_ok());
    }

    #[test]
    fn passwords_without_digits_are_rejected(password in "[a-zA-Z]{8,30}") {
        let policy = PasswordPolicy::default();
        prop_assert!(policy.violations(&password).contains(&PasswordPolicyError::MissingNumber));
        prop_assert!(policy.validate(&password).is_err());
    }

    #[test]
    fn short_passwords_are_rejected(password in "[a-zA-Z0-9]{0,7}") {
        let policy = PasswordPolicy::default();
        let too_short = PasswordPolicyError::TooShort { min_length: 8 };
        prop_assert!(policy.violations(&password).contains(&too_short));
    }

    #[test]
    fn validate_agrees_with_first_violation(password in "[ -~]{0,24}") {
        let policy = PasswordPolicy::default();
        prop_assert_eq!(
            policy.validate(&password).err(),
            policy.violations(&password).into_iter().next()
        );
    }
}

// Property: order line totals are exact cent arithmetic, no float drift
proptest! {
    #[test]
    fn line_totals_sum_to_exact_cents(lines in order_lines_strategy()) {
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let mut expected_cents: i64 = 0;
        let mut total = Decimal::ZERO;
        for (price_cents, quantity) in &lines {
            let item = order_item::Model {
                id: Uuid::new_v4(),
                order_id,
                product_id: Uuid::new_v4(),
                product_name: "Generated product".to_string(),
                quantity: *quantity,
                unit_price: Decimal::new(*price_cents, 2),
                created_at: now,
            };
            expected_cents += price_cents * i64::from(*quantity);
            total += item.line_total();
        }

        prop_assert_eq!(total, Decimal::new(expected_cents, 2));
    }
}

// Property: image URLs always join base and stored name verbatim
proptest! {
    #[test]
    fn image_urls_embed_the_stored_name(name in stored_image_name_strategy()) {
        let store = ImageStore::new(
            PathBuf::from("media/products"),
            Url::parse("http://shop.example.com").unwrap(),
        );

        let url = store.url_for(&name);
        prop_assert_eq!(
            url,
            format!("http://shop.example.com/media/products/{}", name)
        );
    }
}

//! Virtual cards funded from the owner's wallet.
//!
//! Card balances are separate from the wallet: funding moves money wallet
//! to card (with a fee), withdrawing moves it back. Wallet and card rows are
//! locked in the same transaction, wallet first.

use chrono::{Datelike, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::{
    crypto,
    db::DbPool,
    error::AppError,
    models::{
        PageParams,
        card::{Card, CardBrand, CardStatus},
        transaction::{NewEntry, TransactionKind, TransactionResponse},
        wallet::LedgerReceipt,
    },
    services::{
        ledger,
        limits::{self, OperationKind},
        notification_service,
    },
};

pub const MAX_ACTIVE_CARDS: i64 = 3;
const PAN_LENGTH: usize = 16;
const VALIDITY_YEARS: i32 = 3;
const PAN_ATTEMPTS: usize = 5;

/// Luhn check digit for `payload` (all digits, check digit excluded).
pub fn luhn_check_digit(payload: &str) -> Option<u8> {
    let mut sum = 0u32;
    for (i, c) in payload.chars().rev().enumerate() {
        let mut d = c.to_digit(10)?;
        if i % 2 == 0 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    Some(((10 - sum % 10) % 10) as u8)
}

/// Whether `number` is all digits with a valid trailing Luhn check digit.
pub fn luhn_valid(number: &str) -> bool {
    if number.len() < 2 || !number.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let (payload, check) = number.split_at(number.len() - 1);
    match (luhn_check_digit(payload), check.parse::<u8>()) {
        (Some(expected), Ok(actual)) => expected == actual,
        _ => false,
    }
}

/// Random 16-digit PAN with the brand's prefix and a Luhn check digit.
pub fn generate_pan(brand: CardBrand) -> String {
    let mut rng = rand::rng();
    let mut pan = match brand {
        CardBrand::Visa => "4".to_string(),
        CardBrand::Mastercard => format!("5{}", rng.random_range(1..=5u8)),
    };
    while pan.len() < PAN_LENGTH - 1 {
        pan.push(char::from(b'0' + rng.random_range(0..10u8)));
    }
    let check = luhn_check_digit(&pan).unwrap_or(0);
    pan.push(char::from(b'0' + check));
    debug_assert!(luhn_valid(&pan));
    pan
}

pub fn mask_pan(pan: &str) -> String {
    let last4 = &pan[pan.len().saturating_sub(4)..];
    format!("**** **** **** {last4}")
}

/// Issue a card. Returns the card with its plain PAN and CVV, shown once.
///
/// # Errors
///
/// - `Conflict`: the user already has the maximum number of live cards
pub async fn issue(
    pool: &DbPool,
    user_id: Uuid,
    brand: CardBrand,
    label: Option<String>,
) -> Result<(Card, String), AppError> {
    let mut tx = pool.begin().await?;

    // Serializes concurrent issuance for the same user.
    let wallet = ledger::lock_wallet_for_user(&mut tx, user_id).await?;

    let live: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM cards WHERE user_id = $1 AND status <> 'terminated'",
    )
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;
    if live >= MAX_ACTIVE_CARDS {
        return Err(AppError::Conflict(format!(
            "A maximum of {MAX_ACTIVE_CARDS} cards can be active at once"
        )));
    }

    let mut pan = None;
    for _ in 0..PAN_ATTEMPTS {
        let candidate = generate_pan(brand);
        let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM cards WHERE pan = $1)")
            .bind(&candidate)
            .fetch_one(&mut *tx)
            .await?;
        if !taken {
            pan = Some(candidate);
            break;
        }
    }
    let pan = pan.ok_or_else(|| AppError::Conflict("Could not allocate a card number, please retry".to_string()))?;

    let cvv = crypto::random_digits(3);
    let today = Utc::now().date_naive();

    let card = sqlx::query_as::<_, Card>(
        r#"
        INSERT INTO cards (
            user_id, brand, pan, last4, expiry_month, expiry_year, cvv_hash, currency, label
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(brand)
    .bind(&pan)
    .bind(&pan[PAN_LENGTH - 4..])
    .bind(today.month() as i32)
    .bind(today.year() + VALIDITY_YEARS)
    .bind(crypto::sha256_hex(&cvv))
    .bind(&wallet.currency)
    .bind(label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()))
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(%user_id, card_id = %card.id, ?brand, last4 = %card.last4, "card issued");
    notification_service::notify(
        pool,
        user_id,
        "Card issued",
        &format!("Your virtual card {} is ready.", mask_pan(&pan)),
    )
    .await;

    Ok((card, cvv))
}

pub async fn get_card(pool: &DbPool, user_id: Uuid, card_id: Uuid) -> Result<Card, AppError> {
    sqlx::query_as::<_, Card>("SELECT * FROM cards WHERE id = $1 AND user_id = $2")
        .bind(card_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("card"))
}

pub async fn list_cards(pool: &DbPool, user_id: Uuid) -> Result<Vec<Card>, AppError> {
    let cards = sqlx::query_as::<_, Card>(
        "SELECT * FROM cards WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(cards)
}

async fn lock_card(
    conn: &mut sqlx::PgConnection,
    user_id: Uuid,
    card_id: Uuid,
) -> Result<Card, AppError> {
    sqlx::query_as::<_, Card>("SELECT * FROM cards WHERE id = $1 AND user_id = $2 FOR UPDATE")
        .bind(card_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("card"))
}

fn ensure_active(card: &Card) -> Result<(), AppError> {
    match card.status {
        CardStatus::Active => Ok(()),
        CardStatus::Frozen => Err(AppError::Conflict("Card is frozen".to_string())),
        CardStatus::Terminated => Err(AppError::Conflict("Card is terminated".to_string())),
    }
}

async fn set_card_balance(
    conn: &mut sqlx::PgConnection,
    card_id: Uuid,
    balance_cents: i64,
) -> Result<Card, AppError> {
    let card = sqlx::query_as::<_, Card>(
        "UPDATE cards SET balance_cents = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(card_id)
    .bind(balance_cents)
    .fetch_one(&mut *conn)
    .await?;
    Ok(card)
}

/// Move money from the wallet onto an active card. The card funding fee is
/// debited from the wallet on top of `amount_cents`.
pub async fn fund(
    pool: &DbPool,
    user_id: Uuid,
    card_id: Uuid,
    amount_cents: i64,
) -> Result<(Card, LedgerReceipt), AppError> {
    let fee_cents = limits::calculate_fee(OperationKind::CardFunding, amount_cents);
    let reference = crypto::new_reference("CRD");

    let mut tx = pool.begin().await?;

    let mut wallet = ledger::lock_wallet_for_user(&mut tx, user_id).await?;
    let card = lock_card(&mut tx, user_id, card_id).await?;
    ensure_active(&card)?;
    limits::enforce_limits(&mut tx, user_id, OperationKind::CardFunding, amount_cents).await?;
    ledger::ensure_sufficient(wallet.balance_cents, amount_cents, fee_cents)?;

    let mut entries: Vec<TransactionResponse> = vec![
        ledger::apply_entry(
            &mut tx,
            &mut wallet,
            NewEntry::debit(TransactionKind::CardFunding, amount_cents, &reference)
                .with_description(format!("Fund card {}", mask_pan(&card.pan)))
                .with_metadata(serde_json::json!({ "card_id": card.id })),
        )
        .await?
        .into(),
    ];
    if fee_cents > 0 {
        entries.push(
            ledger::apply_entry(
                &mut tx,
                &mut wallet,
                NewEntry::debit(TransactionKind::Fee, fee_cents, format!("{reference}-FEE"))
                    .with_description("Card funding fee"),
            )
            .await?
            .into(),
        );
    }

    let card_balance = card
        .balance_cents
        .checked_add(amount_cents)
        .ok_or_else(|| AppError::InvalidRequest("Amount is too large".to_string()))?;
    let card = set_card_balance(&mut tx, card.id, card_balance).await?;

    tx.commit().await?;

    tracing::info!(%user_id, %card_id, amount_cents, fee_cents, "card funded");

    Ok((
        card,
        LedgerReceipt {
            reference,
            amount_cents,
            fee_cents,
            balance_after_cents: wallet.balance_cents,
            entries,
        },
    ))
}

/// Move money from an active card back to the wallet.
pub async fn withdraw(
    pool: &DbPool,
    user_id: Uuid,
    card_id: Uuid,
    amount_cents: i64,
) -> Result<(Card, LedgerReceipt), AppError> {
    let reference = crypto::new_reference("CRD");

    let mut tx = pool.begin().await?;

    let mut wallet = ledger::lock_wallet_for_user(&mut tx, user_id).await?;
    let card = lock_card(&mut tx, user_id, card_id).await?;
    ensure_active(&card)?;
    if card.balance_cents < amount_cents {
        return Err(AppError::InsufficientBalance);
    }

    let entry = ledger::apply_entry(
        &mut tx,
        &mut wallet,
        NewEntry::credit(TransactionKind::CardWithdrawal, amount_cents, &reference)
            .with_description(format!("Withdraw from card {}", mask_pan(&card.pan)))
            .with_metadata(serde_json::json!({ "card_id": card.id })),
    )
    .await?;
    let card = set_card_balance(&mut tx, card.id, card.balance_cents - amount_cents).await?;

    tx.commit().await?;

    tracing::info!(%user_id, %card_id, amount_cents, "card balance withdrawn");

    Ok((
        card,
        LedgerReceipt {
            reference,
            amount_cents,
            fee_cents: 0,
            balance_after_cents: wallet.balance_cents,
            entries: vec![entry.into()],
        },
    ))
}

/// Allowed owner-initiated status changes.
fn check_transition(from: CardStatus, to: CardStatus) -> Result<(), AppError> {
    match (from, to) {
        (CardStatus::Terminated, _) => Err(AppError::Conflict(
            "Card is terminated and cannot be changed".to_string(),
        )),
        (current, target) if current == target => Err(AppError::Conflict(format!(
            "Card is already {}",
            match target {
                CardStatus::Active => "active",
                CardStatus::Frozen => "frozen",
                CardStatus::Terminated => "terminated",
            }
        ))),
        _ => Ok(()),
    }
}

async fn change_status(
    pool: &DbPool,
    owner_id: Uuid,
    card_id: Uuid,
    target: CardStatus,
) -> Result<Card, AppError> {
    let mut tx = pool.begin().await?;

    // Terminating may refund the balance, so take the wallet lock first.
    let mut wallet = if target == CardStatus::Terminated {
        Some(ledger::lock_wallet_for_user(&mut tx, owner_id).await?)
    } else {
        None
    };

    let card = lock_card(&mut tx, owner_id, card_id).await?;
    check_transition(card.status, target)?;

    if let Some(wallet) = wallet.as_mut().filter(|_| card.balance_cents > 0) {
        ledger::apply_entry(
            &mut tx,
            wallet,
            NewEntry::credit(
                TransactionKind::CardWithdrawal,
                card.balance_cents,
                crypto::new_reference("CRD"),
            )
            .with_description(format!(
                "Balance returned from terminated card {}",
                mask_pan(&card.pan)
            ))
            .with_metadata(serde_json::json!({ "card_id": card.id })),
        )
        .await?;
    }

    let updated = sqlx::query_as::<_, Card>(
        r#"
        UPDATE cards
        SET status = $2,
            balance_cents = CASE WHEN $2 = 'terminated'::card_status THEN 0 ELSE balance_cents END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(card.id)
    .bind(target)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(%owner_id, %card_id, from = ?card.status, to = ?target, "card status changed");
    Ok(updated)
}

pub async fn freeze(pool: &DbPool, user_id: Uuid, card_id: Uuid) -> Result<Card, AppError> {
    change_status(pool, user_id, card_id, CardStatus::Frozen).await
}

pub async fn unfreeze(pool: &DbPool, user_id: Uuid, card_id: Uuid) -> Result<Card, AppError> {
    change_status(pool, user_id, card_id, CardStatus::Active).await
}

/// Return the card balance to the wallet and terminate the card.
pub async fn terminate(pool: &DbPool, user_id: Uuid, card_id: Uuid) -> Result<Card, AppError> {
    let card = change_status(pool, user_id, card_id, CardStatus::Terminated).await?;
    notification_service::notify(
        pool,
        user_id,
        "Card terminated",
        &format!("Card {} has been terminated.", mask_pan(&card.pan)),
    )
    .await;
    Ok(card)
}

pub async fn list_all(
    pool: &DbPool,
    status: Option<CardStatus>,
    page: PageParams,
) -> Result<Vec<Card>, AppError> {
    let cards = sqlx::query_as::<_, Card>(
        r#"
        SELECT * FROM cards
        WHERE ($1::card_status IS NULL OR status = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(status)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(cards)
}

/// Admin status change on any user's card.
pub async fn admin_set_status(
    pool: &DbPool,
    admin_id: Uuid,
    card_id: Uuid,
    target: CardStatus,
) -> Result<Card, AppError> {
    let owner_id: Uuid = sqlx::query_scalar("SELECT user_id FROM cards WHERE id = $1")
        .bind(card_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("card"))?;

    let card = change_status(pool, owner_id, card_id, target).await?;

    tracing::warn!(%admin_id, %card_id, ?target, "card status set by admin");
    notification_service::notify(
        pool,
        owner_id,
        "Card status updated",
        &format!("An administrator set card {} to {:?}.", mask_pan(&card.pan), target),
    )
    .await;

    Ok(card)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_known_luhn_numbers() {
        assert!(luhn_valid("4111111111111111"));
        assert!(luhn_valid("5500005555555559"));
        assert!(luhn_valid("79927398713"));
        assert!(!luhn_valid("4111111111111112"));
        assert!(!luhn_valid("41111111x1111111"));
    }

    #[test]
    fn empty_and_non_ascii_numbers_are_invalid() {
        assert!(!luhn_valid(""));
        assert!(!luhn_valid("4"));
        assert!(!luhn_valid("é"));
        assert!(!luhn_valid("4111é"));
        assert!(!luhn_valid("411111111111111١"));
    }

    #[test]
    fn generated_pans_pass_luhn_with_brand_prefix() {
        for _ in 0..50 {
            let visa = generate_pan(CardBrand::Visa);
            assert_eq!(visa.len(), 16);
            assert!(visa.starts_with('4'));
            assert!(luhn_valid(&visa));

            let mastercard = generate_pan(CardBrand::Mastercard);
            assert_eq!(mastercard.len(), 16);
            assert!(("51"..="55").contains(&&mastercard[..2]));
            assert!(luhn_valid(&mastercard));
        }
    }

    #[test]
    fn masking_keeps_last_four_digits() {
        assert_eq!(mask_pan("4111111111111234"), "**** **** **** 1234");
    }

    #[test]
    fn termination_is_irreversible() {
        assert!(check_transition(CardStatus::Active, CardStatus::Frozen).is_ok());
        assert!(check_transition(CardStatus::Frozen, CardStatus::Active).is_ok());
        assert!(check_transition(CardStatus::Frozen, CardStatus::Terminated).is_ok());
        assert!(check_transition(CardStatus::Terminated, CardStatus::Active).is_err());
        assert!(check_transition(CardStatus::Active, CardStatus::Active).is_err());
    }
}

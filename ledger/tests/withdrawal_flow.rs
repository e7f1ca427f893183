//! Integration tests against a real Postgres instance, covering the
//! withdrawal happy path, compensation-on-failure, and idempotency-key
//! replay. Run with `cargo test -p poolcore-ledger -- --ignored` against
//! a database reachable via `DATABASE_URL`; `sqlx::test` provisions and
//! tears down a scratch database per test.

use chrono::Utc;
use poolcore_domain::{LedgerPort, Money, WalletAddress};
use poolcore_ledger::PgLedgerStore;
use sqlx::PgPool;

async fn seed_user(pool: &PgPool, balance: i64) -> i64 {
    let store = PgLedgerStore::from_pool(pool.clone());
    let addr = WalletAddress::parse("0x1111111111111111111111111111111111111111").unwrap();
    let user = store.create_user(&addr, None).await.unwrap();
    sqlx::query("UPDATE users SET available_balance = $1 WHERE user_id = $2")
        .bind(rust_decimal::Decimal::from(balance))
        .bind(user.user_id)
        .execute(pool)
        .await
        .unwrap();
    user.user_id
}

#[sqlx::test(migrations = "./migrations")]
async fn withdrawal_happy_path(pool: PgPool) {
    let store = PgLedgerStore::from_pool(pool.clone());
    let user_id = seed_user(&pool, 150).await;
    let dest = WalletAddress::parse("0x2222222222222222222222222222222222222222").unwrap();

    let outcome = store
        .request_withdrawal(user_id, Money::from_i64(100), &dest, None, None, Utc::now())
        .await
        .unwrap();
    let withdrawal = match outcome {
        poolcore_domain::WithdrawalRequestOutcome::Created(w) => w,
        _ => panic!("expected a newly created withdrawal"),
    };
    assert_eq!(withdrawal.amount, Money::from_i64(100));

    let user = store.get_user(user_id).await.unwrap().unwrap();
    assert_eq!(user.available_balance, Money::from_i64(50));

    store
        .complete_withdrawal(withdrawal.id, "0xdead", Utc::now())
        .await
        .unwrap();
    let reloaded = store.get_withdrawal(withdrawal.id).await.unwrap().unwrap();
    assert_eq!(reloaded.tx_id.as_deref(), Some("0xdead"));
}

#[sqlx::test(migrations = "./migrations")]
async fn failed_withdrawal_compensates_exactly_once(pool: PgPool) {
    let store = PgLedgerStore::from_pool(pool.clone());
    let user_id = seed_user(&pool, 150).await;
    let dest = WalletAddress::parse("0x3333333333333333333333333333333333333333").unwrap();

    let outcome = store
        .request_withdrawal(user_id, Money::from_i64(100), &dest, None, None, Utc::now())
        .await
        .unwrap();
    let withdrawal = match outcome {
        poolcore_domain::WithdrawalRequestOutcome::Created(w) => w,
        _ => panic!("expected a newly created withdrawal"),
    };

    // Simulate the settlement worker claiming the job before failing it.
    store
        .claim_settlement_job(Utc::now())
        .await
        .unwrap()
        .expect("job should be claimable");
    store.fail_withdrawal(withdrawal.id, "endpoints exhausted").await.unwrap();

    let user = store.get_user(user_id).await.unwrap().unwrap();
    assert_eq!(user.available_balance, Money::from_i64(150));

    // A racing second compensation must be a no-op (guarded by status = processing).
    store.fail_withdrawal(withdrawal.id, "retry").await.unwrap();
    let user_after = store.get_user(user_id).await.unwrap().unwrap();
    assert_eq!(user_after.available_balance, Money::from_i64(150));
}

#[sqlx::test(migrations = "./migrations")]
async fn idempotency_key_prevents_double_debit(pool: PgPool) {
    let store = PgLedgerStore::from_pool(pool.clone());
    let user_id = seed_user(&pool, 150).await;
    let dest = WalletAddress::parse("0x4444444444444444444444444444444444444444").unwrap();

    let first = store
        .request_withdrawal(user_id, Money::from_i64(100), &dest, Some("k1"), None, Utc::now())
        .await
        .unwrap();
    let second = store
        .request_withdrawal(user_id, Money::from_i64(100), &dest, Some("k1"), None, Utc::now())
        .await
        .unwrap();

    let first_id = match first {
        poolcore_domain::WithdrawalRequestOutcome::Created(w) => w.id,
        _ => panic!("first call should create"),
    };
    let second_id = match second {
        poolcore_domain::WithdrawalRequestOutcome::Existing(w) => w.id,
        _ => panic!("second call should return the existing row"),
    };
    assert_eq!(first_id, second_id);

    let user = store.get_user(user_id).await.unwrap().unwrap();
    assert_eq!(user.available_balance, Money::from_i64(50));
}

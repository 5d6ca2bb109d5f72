use affiliate_ledger::db::init_db;
use affiliate_ledger::engine::{
    CommissionDistributor, CommissionSchedule, DistributionError, GraphAnomaly,
};
use affiliate_ledger::{
    Affiliate, AffiliateId, AffiliateStatus, CommissionStatus, Decimal, Order, OrderId,
    OrderStatus, Repository, UserId,
};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;

struct TestLedger {
    pool: SqlitePool,
    repo: Arc<Repository>,
    _temp: TempDir,
}

async fn setup() -> TestLedger {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool.clone()));
    TestLedger {
        pool,
        repo,
        _temp: temp_dir,
    }
}

fn standard_schedule() -> Arc<CommissionSchedule> {
    Arc::new(CommissionSchedule::from_str("1:75000,2:12500,3:12500").unwrap())
}

/// Insert a chain where each affiliate refers the next; returns them top first.
async fn seed_chain(repo: &Repository, names: &[&str]) -> Vec<Affiliate> {
    let mut chain: Vec<Affiliate> = Vec::new();
    for name in names {
        let affiliate = Affiliate::new(
            UserId::new(format!("user-{}", name)),
            name.to_string(),
            chain.last().map(|a| a.id.clone()),
            AffiliateStatus::Active,
        );
        repo.insert_affiliate(&affiliate).await.unwrap();
        chain.push(affiliate);
    }
    chain
}

fn completed_order(id: &str, amount: i64, referrer: &AffiliateId) -> Order {
    Order {
        id: OrderId::new(id),
        buyer: UserId::new("buyer"),
        amount: Decimal::from(amount),
        status: OrderStatus::Completed,
        referred_by: Some(referrer.clone()),
    }
}

async fn earnings(repo: &Repository, id: &AffiliateId) -> Decimal {
    repo.get_affiliate(id).await.unwrap().unwrap().total_earnings
}

#[tokio::test]
async fn test_three_level_schedule_over_four_deep_chain() {
    let ledger = setup().await;
    let chain = seed_chain(&ledger.repo, &["a", "b", "c", "d"]).await;
    let (a, b, c, d) = (&chain[0], &chain[1], &chain[2], &chain[3]);

    let distributor = CommissionDistributor::new(ledger.repo.clone(), standard_schedule(), None);
    let order = completed_order("ORD-1", 1_000_000, &d.id);
    let distribution = distributor.distribute(&order, &d.id).await.unwrap();

    let paid: Vec<(u32, &AffiliateId, Decimal)> = distribution
        .commissions
        .iter()
        .map(|c| (c.level, &c.affiliate_id, c.amount))
        .collect();
    assert_eq!(
        paid,
        vec![
            (1, &d.id, Decimal::from(75000)),
            (2, &c.id, Decimal::from(12500)),
            (3, &b.id, Decimal::from(12500)),
        ]
    );
    assert_eq!(distribution.summary.total_commission, Decimal::from(100000));
    assert_eq!(distribution.summary.levels_paid, 3);
    assert_eq!(distribution.summary.order_total, Decimal::from(1_000_000));
    assert!(distribution.anomaly.is_none());

    assert_eq!(earnings(&ledger.repo, &d.id).await, Decimal::from(75000));
    assert_eq!(earnings(&ledger.repo, &c.id).await, Decimal::from(12500));
    assert_eq!(earnings(&ledger.repo, &b.id).await, Decimal::from(12500));
    assert_eq!(earnings(&ledger.repo, &a.id).await, Decimal::zero());

    let stored = ledger
        .repo
        .list_commissions_for_order(&order.id)
        .await
        .unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|c| c.status == CommissionStatus::Unpaid));
    assert_eq!(stored[1].reference, "L2 commission for order ORD-1");

    let claim = ledger.repo.get_distribution(&order.id).await.unwrap().unwrap();
    assert_eq!(claim.total_commission, Decimal::from(100000));
    assert_eq!(claim.levels_paid, 3);
    assert_eq!(claim.referrer_id, d.id);
}

#[tokio::test]
async fn test_second_run_for_same_order_is_duplicate() {
    let ledger = setup().await;
    let chain = seed_chain(&ledger.repo, &["a", "b"]).await;
    let distributor = CommissionDistributor::new(ledger.repo.clone(), standard_schedule(), None);
    let order = completed_order("ORD-1", 500, &chain[1].id);

    distributor.distribute(&order, &chain[1].id).await.unwrap();
    let err = distributor
        .distribute(&order, &chain[1].id)
        .await
        .unwrap_err();
    assert!(matches!(err, DistributionError::DuplicateOrder(ref id) if id.as_str() == "ORD-1"));

    assert_eq!(ledger.repo.list_commissions().await.unwrap().len(), 2);
    assert_eq!(earnings(&ledger.repo, &chain[1].id).await, Decimal::from(75000));
    assert_eq!(earnings(&ledger.repo, &chain[0].id).await, Decimal::from(12500));
}

#[tokio::test]
async fn test_concurrent_runs_for_same_order_pay_once() {
    let ledger = setup().await;
    let chain = seed_chain(&ledger.repo, &["a", "b", "c"]).await;
    let distributor = Arc::new(CommissionDistributor::new(
        ledger.repo.clone(),
        standard_schedule(),
        None,
    ));
    let referrer = chain[2].id.clone();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let distributor = distributor.clone();
        let referrer = referrer.clone();
        handles.push(tokio::spawn(async move {
            let order = completed_order("ORD-RACE", 500, &referrer);
            distributor.distribute(&order, &referrer).await
        }));
    }

    let mut ok = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(DistributionError::DuplicateOrder(_)) => duplicates += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(duplicates, 3);
    assert_eq!(ledger.repo.list_commissions().await.unwrap().len(), 3);
    assert_eq!(earnings(&ledger.repo, &referrer).await, Decimal::from(75000));
}

#[tokio::test]
async fn test_unknown_referrer_writes_nothing_and_can_be_retried() {
    let ledger = setup().await;
    let chain = seed_chain(&ledger.repo, &["a"]).await;
    let distributor = CommissionDistributor::new(ledger.repo.clone(), standard_schedule(), None);

    let ghost = AffiliateId::new("ghost");
    let order = completed_order("ORD-1", 500, &ghost);
    let err = distributor.distribute(&order, &ghost).await.unwrap_err();
    assert!(matches!(err, DistributionError::ReferrerNotFound(ref id) if *id == ghost));

    assert!(ledger.repo.get_distribution(&order.id).await.unwrap().is_none());
    assert!(ledger.repo.list_commissions().await.unwrap().is_empty());

    // The failed run left no claim behind.
    let order = completed_order("ORD-1", 500, &chain[0].id);
    let distribution = distributor.distribute(&order, &chain[0].id).await.unwrap();
    assert_eq!(distribution.summary.levels_paid, 1);
}

#[tokio::test]
async fn test_only_completed_orders_distribute() {
    let ledger = setup().await;
    let chain = seed_chain(&ledger.repo, &["a"]).await;
    let distributor = CommissionDistributor::new(ledger.repo.clone(), standard_schedule(), None);

    for status in [OrderStatus::Pending, OrderStatus::Cancelled] {
        let mut order = completed_order("ORD-1", 500, &chain[0].id);
        order.status = status;
        let err = distributor.distribute(&order, &chain[0].id).await.unwrap_err();
        assert!(matches!(err, DistributionError::OrderNotCompleted { .. }));
    }
    assert!(ledger.repo.get_distribution(&OrderId::new("ORD-1")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_upline_cycle_stops_walk_and_pays_each_affiliate_once() {
    let ledger = setup().await;
    let chain = seed_chain(&ledger.repo, &["a", "b", "c"]).await;

    // Corrupt the data: the root now points at the bottom of its own chain.
    sqlx::query("UPDATE affiliates SET referred_by = ? WHERE id = ?")
        .bind(chain[2].id.as_str())
        .bind(chain[0].id.as_str())
        .execute(&ledger.pool)
        .await
        .unwrap();

    let schedule = Arc::new(
        CommissionSchedule::fixed(&[(1, 10), (2, 10), (3, 10), (4, 10), (5, 10)]).unwrap(),
    );
    let distributor = CommissionDistributor::new(ledger.repo.clone(), schedule, None);
    let order = completed_order("ORD-1", 500, &chain[2].id);
    let distribution = distributor.distribute(&order, &chain[2].id).await.unwrap();

    assert_eq!(distribution.summary.levels_paid, 3);
    assert_eq!(
        distribution.anomaly,
        Some(GraphAnomaly::CycleDetected {
            affiliate_id: chain[2].id.clone()
        })
    );
    for affiliate in &chain {
        assert_eq!(earnings(&ledger.repo, &affiliate.id).await, Decimal::from(10));
    }
}

#[tokio::test]
async fn test_depth_cap_limits_levels() {
    let ledger = setup().await;
    let chain = seed_chain(&ledger.repo, &["a", "b", "c", "d"]).await;
    let distributor =
        CommissionDistributor::new(ledger.repo.clone(), standard_schedule(), Some(1));
    assert_eq!(distributor.max_depth(), 1);

    let order = completed_order("ORD-1", 500, &chain[3].id);
    let distribution = distributor.distribute(&order, &chain[3].id).await.unwrap();
    assert_eq!(distribution.commissions.len(), 1);
    assert_eq!(earnings(&ledger.repo, &chain[2].id).await, Decimal::zero());
}

#[tokio::test]
async fn test_percentage_schedule_rounds_to_cents() {
    let ledger = setup().await;
    let chain = seed_chain(&ledger.repo, &["a", "b"]).await;
    let schedule = Arc::new(CommissionSchedule::from_str("1:10%,2:2.5%").unwrap());
    let distributor = CommissionDistributor::new(ledger.repo.clone(), schedule, None);

    let mut order = completed_order("ORD-1", 0, &chain[1].id);
    order.amount = Decimal::from_str("33.35").unwrap();
    let distribution = distributor.distribute(&order, &chain[1].id).await.unwrap();

    // 10% of 33.35 = 3.335 -> 3.34, 2.5% = 0.83375 -> 0.83
    let amounts: Vec<Decimal> = distribution.commissions.iter().map(|c| c.amount).collect();
    assert_eq!(
        amounts,
        vec![
            Decimal::from_str("3.34").unwrap(),
            Decimal::from_str("0.83").unwrap()
        ]
    );
    assert_eq!(
        earnings(&ledger.repo, &chain[1].id).await,
        Decimal::from_str("3.34").unwrap()
    );
}

#[tokio::test]
async fn test_zero_rate_levels_produce_no_records() {
    let ledger = setup().await;
    let chain = seed_chain(&ledger.repo, &["a", "b", "c"]).await;
    let schedule = Arc::new(CommissionSchedule::from_str("1:100,2:0,3:5").unwrap());
    let distributor = CommissionDistributor::new(ledger.repo.clone(), schedule, None);

    let order = completed_order("ORD-1", 500, &chain[2].id);
    let distribution = distributor.distribute(&order, &chain[2].id).await.unwrap();

    let levels: Vec<u32> = distribution.commissions.iter().map(|c| c.level).collect();
    assert_eq!(levels, vec![1, 3]);
    assert_eq!(distribution.summary.levels_paid, 2);
    assert_eq!(earnings(&ledger.repo, &chain[1].id).await, Decimal::zero());
}

#[tokio::test]
async fn test_fractional_fixed_rates_match_stored_records() {
    let ledger = setup().await;
    let chain = seed_chain(&ledger.repo, &["a", "b", "c"]).await;
    let schedule = Arc::new(CommissionSchedule::from_str("1:10.005,2:0.004,3:2.499").unwrap());
    let distributor = CommissionDistributor::new(ledger.repo.clone(), schedule, None);

    let order = completed_order("ORD-1", 500, &chain[2].id);
    let distribution = distributor.distribute(&order, &chain[2].id).await.unwrap();

    // Level 2 rounds to 0.00 and earns nothing.
    let returned: Vec<(u32, Decimal)> = distribution
        .commissions
        .iter()
        .map(|c| (c.level, c.amount))
        .collect();
    assert_eq!(
        returned,
        vec![
            (1, Decimal::from_str("10.01").unwrap()),
            (3, Decimal::from_str("2.50").unwrap()),
        ]
    );
    assert_eq!(
        distribution.summary.total_commission,
        Decimal::from_str("12.51").unwrap()
    );
    assert_eq!(distribution.summary.levels_paid, 2);

    let stored: Vec<(u32, Decimal)> = ledger
        .repo
        .list_commissions_for_order(&order.id)
        .await
        .unwrap()
        .iter()
        .map(|c| (c.level, c.amount))
        .collect();
    assert_eq!(stored, returned);

    let claim = ledger.repo.get_distribution(&order.id).await.unwrap().unwrap();
    assert_eq!(claim.total_commission, distribution.summary.total_commission);

    assert_eq!(earnings(&ledger.repo, &chain[2].id).await, Decimal::from_str("10.01").unwrap());
    assert_eq!(earnings(&ledger.repo, &chain[1].id).await, Decimal::zero());
    assert_eq!(earnings(&ledger.repo, &chain[0].id).await, Decimal::from_str("2.50").unwrap());
}

use super::*;
use crate::test_support::{addr, FakeChain};
use chain::abi::command_token;
use proptest::prelude::*;
use shared::domain::Selector;

const MASTER: u8 = 0xc0;

fn locked(key: CommandKey) -> LockMap {
    LockMap::from([(key, true)])
}

fn command(last: u8, selector: u8) -> Command {
    Command::new(addr(last), Selector([selector; 4]))
}

#[test]
fn empty_draft_is_invalid_with_no_targets() {
    let report = DryRunReport::build(Vec::new(), FeeMap::new(), FeeMap::new(), &LockMap::new());
    assert!(!report.valid);
    assert_eq!(report.issues, vec![NO_TARGETS.to_string()]);
    assert!(!is_valid(&[], &LockMap::new()));
}

#[test]
fn locked_entry_kept_in_draft_is_valid() {
    let draft = parse_draft(
        r#"[{"target": "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA1", "selector": "0x11111111"}]"#,
    )
    .expect("parse");
    let key: CommandKey = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1:0x11111111"
        .parse()
        .expect("key");
    let locks = locked(key);
    assert!(detect_locked_removals(&draft, &locks).is_empty());
    assert!(is_valid(&draft, &locks));
}

#[test]
fn locked_entry_missing_from_draft_blocks() {
    let key: CommandKey = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1:0x11111111"
        .parse()
        .expect("key");
    let locks = locked(key);
    let draft = vec![command(2, 0x22)];
    let removed = detect_locked_removals(&draft, &locks);
    assert_eq!(removed, vec![Command::new(key.target, key.selector)]);
    assert!(!is_valid(&draft, &locks));
}

#[test]
fn report_validity_matches_is_valid() {
    let key = command(1, 0x11).key();
    let locks = locked(key);
    for draft in [vec![], vec![command(1, 0x11)], vec![command(2, 0x22)]] {
        let expected = is_valid(&draft, &locks);
        let report = DryRunReport::build(draft, FeeMap::new(), FeeMap::new(), &locks);
        assert_eq!(report.valid, expected);
    }
}

#[test]
fn unlocked_flags_never_block() {
    let key = command(1, 0x11).key();
    let locks = LockMap::from([(key, false)]);
    assert!(detect_locked_removals(&[command(2, 0x22)], &locks).is_empty());
}

#[test]
fn targets_are_unique_in_first_seen_order() {
    let draft = vec![command(2, 1), command(1, 1), command(2, 2), command(3, 1)];
    assert_eq!(compute_targets(&draft), vec![addr(2), addr(1), addr(3)]);
}

#[test]
fn fee_summary_treats_unknown_as_zero() {
    let existing = FeeMap::from([(addr(1), Some(30)), (addr(2), None)]);
    let draft = FeeMap::from([(addr(1), Some(30)), (addr(3), Some(15))]);
    let summary = compute_fee_summary(&existing, &draft);
    assert_eq!(summary.existing_total, Some(30));
    assert_eq!(summary.draft_total, Some(45));
    assert_eq!(summary.delta, Some(15));
}

#[test]
fn fee_delta_undefined_only_when_both_unresolved() {
    let unknown = FeeMap::from([(addr(1), None)]);
    let known = FeeMap::from([(addr(2), Some(10))]);
    assert_eq!(compute_fee_summary(&unknown, &unknown).delta, None);
    assert_eq!(compute_fee_summary(&unknown, &known).delta, Some(10));
    assert_eq!(compute_fee_summary(&known, &FeeMap::new()).delta, Some(-10));
}

#[tokio::test]
async fn fee_reads_degrade_per_target() {
    let chain = FakeChain::new();
    chain.respond(addr(1), &master_control::command_fee_bips(), &[], &[Token::uint(25u64)]);
    let validator = DryRunValidator::new(chain.reader(), Some(addr(MASTER)));

    let fees = validator.fetch_fees(&[addr(1), addr(2)]).await;
    assert_eq!(fees, FeeMap::from([(addr(1), Some(25)), (addr(2), None)]));
}

#[tokio::test]
async fn snapshot_reads_commands_locks_and_fees() {
    let chain = FakeChain::new();
    let pool = PoolId::from(9);
    let hook = HookPath::parse("beforeSwap").expect("hook");
    let existing = vec![command(1, 0x11), command(2, 0x22)];

    chain.respond(
        addr(MASTER),
        &master_control::get_commands(),
        &master_control::pool_hook_args(pool, hook),
        &[Token::Array(existing.iter().map(command_token).collect())],
    );
    chain.fail(
        addr(MASTER),
        &master_control::pool_command_targets(),
        &[Token::Uint(pool.0)],
        chain::ChainError::Reverted("no targets view".into()),
    );
    for (cmd, flag) in [(&existing[0], true), (&existing[1], false)] {
        let mut args = master_control::pool_hook_args(pool, hook);
        args.push(Token::Address(cmd.target));
        args.push(Token::FixedBytes(cmd.selector.0.to_vec()));
        chain.respond(
            addr(MASTER),
            &master_control::command_locked_for_pool(),
            &args,
            &[Token::Bool(flag)],
        );
    }
    chain.respond(addr(1), &master_control::command_fee_bips(), &[], &[Token::uint(10u64)]);
    chain.respond(addr(2), &master_control::command_fee_bips(), &[], &[Token::uint(20u64)]);

    let validator = DryRunValidator::new(chain.reader(), Some(addr(MASTER)));
    let snapshot = validator.snapshot(pool, hook).await;
    assert_eq!(snapshot.commands.as_deref(), Some(existing.as_slice()));
    assert_eq!(snapshot.targets, None);
    assert_eq!(
        snapshot.locks,
        LockMap::from([(existing[0].key(), true), (existing[1].key(), false)])
    );
    assert_eq!(
        snapshot.fees,
        FeeMap::from([(addr(1), Some(10)), (addr(2), Some(20))])
    );

    let report = validator
        .dry_run(
            r#"[{"target": "0x0000000000000000000000000000000000000002", "selector": "0x22222222"}]"#,
            &snapshot,
        )
        .await
        .expect("dry run");
    assert!(!report.valid);
    assert_eq!(report.locked_removals, vec![existing[0].clone()]);
    assert_eq!(report.summary.delta, Some(-10));
}

#[tokio::test]
async fn pool_reads_need_master_control() {
    let chain = FakeChain::new();
    let validator = DryRunValidator::new(chain.reader(), None);
    let err = validator
        .fetch_pool_commands(PoolId::from(1), HookPath::default())
        .await
        .expect_err("no master");
    assert!(matches!(err, CoreError::MissingContext(_)));
    let snapshot = validator.snapshot(PoolId::from(1), HookPath::default()).await;
    assert!(snapshot.commands.is_none());
}

#[tokio::test]
async fn block_commands_fall_through_getters() {
    let chain = FakeChain::new();
    chain.respond(
        addr(MASTER),
        &master_control::block_commands("blockCommands"),
        &[Token::uint(101u64)],
        &[Token::Array(vec![command_token(&command(4, 0x44))])],
    );
    let validator = DryRunValidator::new(chain.reader(), Some(addr(MASTER)));
    assert_eq!(
        validator.fetch_block_commands(101).await,
        Some(vec![command(4, 0x44)])
    );
    assert_eq!(validator.fetch_block_commands(102).await, None);
}

fn arb_fees() -> impl Strategy<Value = Vec<(u8, Option<u32>)>> {
    prop::collection::btree_map(any::<u8>(), prop::option::of(any::<u32>()), 0..16)
        .prop_map(|fees| fees.into_iter().collect())
}

fn fee_map(items: impl Iterator<Item = (u8, Option<u32>)>) -> FeeMap {
    items.map(|(t, fee)| (addr(t), fee.map(u64::from))).collect()
}

proptest! {
    #[test]
    fn fee_totals_ignore_target_order(existing in arb_fees(), draft in arb_fees()) {
        let forward = compute_fee_summary(
            &fee_map(existing.iter().copied()),
            &fee_map(draft.iter().copied()),
        );
        let backward = compute_fee_summary(
            &fee_map(existing.iter().rev().copied()),
            &fee_map(draft.iter().rev().copied()),
        );
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn draft_superset_of_locked_keys_has_no_removals(
        locked_ids in prop::collection::btree_set(1u8..40, 0..10),
        extra in prop::collection::vec(1u8..80, 0..10),
    ) {
        let locks: LockMap = locked_ids.iter().map(|id| (command(*id, *id).key(), true)).collect();
        let mut draft: Vec<Command> = extra.iter().map(|id| command(*id, 0xee)).collect();
        draft.extend(locked_ids.iter().map(|id| command(*id, *id)));
        prop_assert!(detect_locked_removals(&draft, &locks).is_empty());
    }
}

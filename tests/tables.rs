//! Integration tests for table reconstruction and the snapshot lifecycle.

mod common;

use common::*;
use ovlscope::prelude::*;

fn scope(builder: TargetBuilder) -> OverlayScope<SnapshotHost> {
    OverlayScope::new(builder.build(), EngineConfig::default())
}

#[test]
fn group_table_round_trip() {
    // Scaled offsets [0, 1, 3, 5, 0] with 512-byte entries must produce exactly
    // three groups with sizes 512, 1024, 1024 at consecutive storage addresses.
    let mut scope = scope(TargetBuilder::new());
    let snapshot = scope.get_snapshot(false).unwrap();

    assert_eq!(snapshot.group_count(), 3);

    let expect = [
        (STORAGE_START, 512u32),
        (STORAGE_START + 512, 1024),
        (STORAGE_START + 1536, 1024),
    ];
    for (group, (base, size)) in snapshot.groups().iter().zip(expect) {
        assert_eq!(group.base_address(), base);
        assert_eq!(group.size_bytes(), size);
    }
}

#[test]
fn first_group_offset_must_be_zero() {
    let mut builder = TargetBuilder::new();
    builder.group_table(&[2, 3, 0]);

    let mut scope = scope(builder);
    assert!(matches!(
        scope.get_snapshot(false),
        Err(Error::Malformed { .. })
    ));
}

#[test]
fn group_table_without_terminator_is_out_of_bounds() {
    let mut builder = TargetBuilder::new();
    // The multi-group table starts 8 bytes in, so the group table has room for four
    // offsets - and none of them is the zero terminator.
    builder.group_table(&[0, 1, 2, 3]);
    builder.multi_groups(8, &[0, 0]);

    let mut scope = scope(builder);
    assert!(matches!(
        scope.get_snapshot(false),
        Err(Error::OutOfBounds)
    ));
}

#[test]
fn multi_group_termination() {
    // A stream [T1, T2, 0, T3, 0, 0] yields two multi-groups, [T1, T2] and [T3];
    // the trailing zero ends the table without a spurious empty multi-group.
    let t1 = token(1, 0x20);
    let t2 = token(2, 0x20);
    let t3 = token(0, 0);

    let mut builder = TargetBuilder::new();
    builder.multi_groups(12, &[t1, t2, 0, t3, 0, 0]);

    let mut scope = scope(builder);
    let snapshot = scope.get_snapshot(false).unwrap();

    assert!(snapshot.is_multi_group_enabled());
    assert_eq!(snapshot.multi_group_count(), 2);

    let first = &snapshot.multi_groups()[0];
    assert_eq!(first.index(), 0);
    let tokens: Vec<u32> = first.members().iter().map(|m| m.token().value()).collect();
    assert_eq!(tokens, vec![t1, t2]);

    let second = &snapshot.multi_groups()[1];
    assert_eq!(second.index(), 3);
    assert_eq!(second.members().len(), 1);
    assert_eq!(second.members()[0].token().value(), t3);

    // Flat-table lookups resolve members and reject separators.
    assert_eq!(snapshot.multi_group_token_at(1).unwrap().value(), t2);
    assert!(snapshot.multi_group_token_at(2).is_err());
}

#[test]
fn multi_group_members_must_share_a_size() {
    // Group 1 (1024 bytes) at offset 0x20 and group 0 (512 bytes) at offset 0
    // describe different code blocks.
    let mut builder = TargetBuilder::new();
    builder.multi_groups(12, &[token(1, 0x20), token(0, 0), 0, 0]);

    let mut scope = scope(builder);
    match scope.get_snapshot(false) {
        Err(Error::Malformed { message, .. }) => {
            assert!(message.contains("multiple sizes for multi-group"));
        }
        other => panic!("expected Malformed, got {other:?}"),
    }
}

#[test]
fn unsupported_mg_index_offset_is_rejected_up_front() {
    // 12 is neither of the two known record layouts; the configuration must be
    // rejected before any table parsing can happen.
    assert!(matches!(
        EngineConfig::new(512, 4096, 12),
        Err(Error::UnsupportedConfiguration(_))
    ));
}

#[test]
fn unknown_eviction_policy_is_unsupported() {
    let mut builder = TargetBuilder::new();
    builder.policy_byte(2);

    let mut scope = scope(builder);
    assert!(matches!(
        scope.get_snapshot(false),
        Err(Error::UnsupportedConfiguration(_))
    ));
}

#[test]
fn snapshot_requires_initialisation() {
    let mut builder = TargetBuilder::new();
    builder.not_initialized();

    let mut scope = scope(builder);
    assert!(matches!(
        scope.get_snapshot(false),
        Err(Error::NotInitialized)
    ));
}

#[test]
fn snapshot_is_memoized_until_invalidated() {
    let mut scope = scope(TargetBuilder::new());

    let first = scope.get_snapshot(false).unwrap();
    let second = scope.get_snapshot(false).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));

    scope.invalidate();
    let third = scope.get_snapshot(false).unwrap();
    assert!(!std::sync::Arc::ptr_eq(&first, &third));

    let fourth = scope.get_snapshot(true).unwrap();
    assert!(!std::sync::Arc::ptr_eq(&third, &fourth));
}

#[test]
fn failed_rebuild_preserves_the_previous_snapshot() {
    use std::cell::Cell;

    // A host whose memory reads can be switched off, while the engine still
    // reports initialised: a rebuild against it must fail without touching the
    // previously cached snapshot.
    struct FlakyHost {
        inner: SnapshotHost,
        fail_reads: Cell<bool>,
    }

    impl TargetHost for FlakyHost {
        fn read_bytes(&self, address: u32, length: usize) -> Result<Vec<u8>> {
            if self.fail_reads.get() {
                return Err(Error::Memory { address, length });
            }
            self.inner.read_bytes(address, length)
        }

        fn resolve_symbol_address(&self, name: &str) -> Option<u32> {
            self.inner.resolve_symbol_address(name)
        }

        fn read_register(&self, name: &str) -> Result<u32> {
            self.inner.read_register(name)
        }

        fn is_engine_initialized(&self) -> bool {
            true
        }
    }

    let host = FlakyHost {
        inner: TargetBuilder::new().build(),
        fail_reads: Cell::new(false),
    };
    let mut scope = OverlayScope::new(host, EngineConfig::default());

    let first = scope.get_snapshot(false).unwrap();

    scope.host().fail_reads.set(true);
    assert!(matches!(
        scope.get_snapshot(true),
        Err(Error::Memory { .. })
    ));

    scope.host().fail_reads.set(false);
    let after_failure = scope.get_snapshot(false).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &after_failure));
}

#[test]
fn status_report_renders() {
    let mut builder = TargetBuilder::new();
    builder.occupy_slot(0, 1, 2, 255, 255);
    builder.lru(0, 0);

    let mut scope = scope(builder);
    let report = scope.status_report().unwrap();

    assert_eq!(report.groups.len(), 3);
    assert_eq!(report.residents.len(), 1);
    assert_eq!(report.residents[0].group_id, 1);

    let rendered = report.to_string();
    assert!(rendered.contains("Overlay regions:"));
    assert!(rendered.contains("Current overlay mappings:"));
}

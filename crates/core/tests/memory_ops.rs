//! Memory operation tests against the in-memory adapter.
//!
//! These cover the operation semantics end to end: creation policy, path
//! normalization, three-valued updates, move collisions, expiration-aware
//! listing/pruning, recency, and index-failure recovery.

mod helpers;

use cortex_core::ops::memory::{
    self, GetOptions, ListOptions, PruneOptions, RecentOptions, UpdateMemoryInput,
};
use cortex_core::ops::{MemoryOpError, Patch};
use cortex_core::storage::CategoryStore;
use cortex_core::CategoryPath;
use helpers::{expiring_input, input, memory_adapter, seed_memory, seed_with, ts};

// ---------------------------------------------------------------------------
// create / get (scenario A)
// ---------------------------------------------------------------------------

#[test]
fn create_and_get_round_trip() {
    let adapter = memory_adapter();
    adapter.ensure_category(&CategoryPath::parse("project/notes").unwrap()).unwrap();

    let mut req = input("hello");
    req.tags = vec!["a".to_string()];
    let created =
        memory::create(&adapter, "project/notes/alpha", req, Some(ts("2025-01-01T00:00:00Z")))
            .unwrap();
    assert_eq!(created.path.to_string(), "project/notes/alpha");

    let fetched = memory::get(&adapter, "project/notes/alpha", GetOptions::default()).unwrap();
    assert_eq!(fetched.content, "hello");
    assert_eq!(fetched.metadata.tags, vec!["a"]);
    assert_eq!(fetched.metadata.created_at, ts("2025-01-01T00:00:00Z"));
    assert_eq!(fetched.metadata.updated_at, ts("2025-01-01T00:00:00Z"));

    let listing = memory::list(
        &adapter,
        ListOptions { category: Some("project/notes".to_string()), ..Default::default() },
    )
    .unwrap();
    assert_eq!(listing.memories.len(), 1);
    assert_eq!(listing.memories[0].path.to_string(), "project/notes/alpha");
}

#[test]
fn create_requires_existing_category() {
    let adapter = memory_adapter();
    let err = memory::create(&adapter, "missing/alpha", input("x"), None).unwrap_err();
    assert!(matches!(err, MemoryOpError::CategoryNotFound(_)));
    assert_eq!(err.code(), "CATEGORY_NOT_FOUND");
}

#[test]
fn create_rejects_invalid_paths() {
    let adapter = memory_adapter();
    assert_eq!(
        memory::create(&adapter, "alpha", input("x"), None).unwrap_err().code(),
        "INVALID_PATH"
    );
    assert_eq!(
        memory::create(&adapter, "Bad/alpha", input("x"), None).unwrap_err().code(),
        "INVALID_PATH"
    );
}

#[test]
fn create_with_empty_content_succeeds() {
    let adapter = memory_adapter();
    let created = seed_memory(&adapter, "notes/empty", "");
    assert_eq!(created.content, "");
    let fetched = memory::get(&adapter, "notes/empty", GetOptions::default()).unwrap();
    assert_eq!(fetched.content, "");
}

// ---------------------------------------------------------------------------
// Path normalization (scenario B)
// ---------------------------------------------------------------------------

#[test]
fn create_normalizes_doubled_slashes() {
    let adapter = memory_adapter();
    adapter.ensure_category(&CategoryPath::parse("project/notes").unwrap()).unwrap();

    let created =
        memory::create(&adapter, "project//notes//beta", input("b"), None).unwrap();
    assert_eq!(created.path.to_string(), "project/notes/beta");

    let direct = memory::get(&adapter, "project/notes/beta", GetOptions::default()).unwrap();
    let doubled = memory::get(&adapter, "project//notes//beta", GetOptions::default()).unwrap();
    assert_eq!(direct, doubled);
}

// ---------------------------------------------------------------------------
// get expiration policy
// ---------------------------------------------------------------------------

#[test]
fn get_rejects_expired_unless_included() {
    let adapter = memory_adapter();
    seed_with(
        &adapter,
        "notes/stale",
        expiring_input("old", "2020-01-01T00:00:00Z"),
        "2019-01-01T00:00:00Z",
    );

    let opts = GetOptions { now: Some(ts("2025-01-01T00:00:00Z")), ..Default::default() };
    let err = memory::get(&adapter, "notes/stale", opts).unwrap_err();
    assert_eq!(err.code(), "MEMORY_EXPIRED");

    let opts = GetOptions { include_expired: true, now: Some(ts("2025-01-01T00:00:00Z")) };
    assert!(memory::get(&adapter, "notes/stale", opts).is_ok());
}

#[test]
fn expiry_boundary_is_inclusive() {
    let adapter = memory_adapter();
    seed_with(
        &adapter,
        "notes/edge",
        expiring_input("x", "2025-06-01T00:00:00Z"),
        "2025-01-01T00:00:00Z",
    );

    // expiresAt exactly equal to now counts as expired.
    let opts = GetOptions { now: Some(ts("2025-06-01T00:00:00Z")), ..Default::default() };
    assert_eq!(memory::get(&adapter, "notes/edge", opts).unwrap_err().code(), "MEMORY_EXPIRED");
}

// ---------------------------------------------------------------------------
// update (scenario C)
// ---------------------------------------------------------------------------

#[test]
fn update_requires_at_least_one_field() {
    let adapter = memory_adapter();
    seed_memory(&adapter, "notes/a", "x");
    let err =
        memory::update(&adapter, "notes/a", UpdateMemoryInput::default(), None).unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");
}

#[test]
fn update_merges_and_preserves_created_at() {
    let adapter = memory_adapter();
    seed_memory(&adapter, "notes/a", "original");

    let updated = memory::update(
        &adapter,
        "notes/a",
        UpdateMemoryInput { content: Some("revised".to_string()), ..Default::default() },
        Some(ts("2025-02-01T00:00:00Z")),
    )
    .unwrap();
    assert_eq!(updated.content, "revised");
    assert_eq!(updated.metadata.created_at, ts("2025-01-01T00:00:00Z"));
    assert_eq!(updated.metadata.updated_at, ts("2025-02-01T00:00:00Z"));
}

#[test]
fn update_expires_at_is_three_valued() {
    let adapter = memory_adapter();
    seed_with(
        &adapter,
        "notes/a",
        expiring_input("x", "2030-01-01T00:00:00Z"),
        "2025-01-01T00:00:00Z",
    );

    // Explicit clear.
    let updated = memory::update(
        &adapter,
        "notes/a",
        UpdateMemoryInput { expires_at: Patch::Clear, ..Default::default() },
        Some(ts("2025-01-02T00:00:00Z")),
    )
    .unwrap();
    assert_eq!(updated.metadata.expires_at, None);

    // Explicit set.
    let updated = memory::update(
        &adapter,
        "notes/a",
        UpdateMemoryInput {
            expires_at: Patch::Set(ts("2040-01-01T00:00:00Z")),
            ..Default::default()
        },
        Some(ts("2025-01-03T00:00:00Z")),
    )
    .unwrap();
    assert_eq!(updated.metadata.expires_at, Some(ts("2040-01-01T00:00:00Z")));

    // Absent keeps the existing value while other fields change.
    let updated = memory::update(
        &adapter,
        "notes/a",
        UpdateMemoryInput { tags: Some(vec!["kept".to_string()]), ..Default::default() },
        Some(ts("2025-01-04T00:00:00Z")),
    )
    .unwrap();
    assert_eq!(updated.metadata.expires_at, Some(ts("2040-01-01T00:00:00Z")));
    assert_eq!(updated.metadata.tags, vec!["kept"]);
}

#[test]
fn update_replaces_citations_entirely() {
    let adapter = memory_adapter();
    let mut req = input("x");
    req.citations = vec!["a.md".to_string(), "b.md".to_string()];
    seed_with(&adapter, "notes/a", req, "2025-01-01T00:00:00Z");

    let updated = memory::update(
        &adapter,
        "notes/a",
        UpdateMemoryInput { citations: Some(vec!["c.md".to_string()]), ..Default::default() },
        None,
    )
    .unwrap();
    assert_eq!(updated.metadata.citations, vec!["c.md"]);
}

#[test]
fn update_missing_memory_is_not_found() {
    let adapter = memory_adapter();
    adapter.ensure_category(&CategoryPath::parse("notes").unwrap()).unwrap();
    let err = memory::update(
        &adapter,
        "notes/ghost",
        UpdateMemoryInput { content: Some("x".to_string()), ..Default::default() },
        None,
    )
    .unwrap_err();
    assert_eq!(err.code(), "MEMORY_NOT_FOUND");
}

// ---------------------------------------------------------------------------
// move (scenarios D, invariant 9)
// ---------------------------------------------------------------------------

#[test]
fn move_to_occupied_destination_fails_and_leaves_both_intact() {
    let adapter = memory_adapter();
    seed_memory(&adapter, "a/x", "first");
    seed_memory(&adapter, "b/x", "second");

    let err = memory::relocate(&adapter, "a/x", "b/x").unwrap_err();
    assert_eq!(err.code(), "DESTINATION_EXISTS");

    assert_eq!(memory::get(&adapter, "a/x", GetOptions::default()).unwrap().content, "first");
    assert_eq!(memory::get(&adapter, "b/x", GetOptions::default()).unwrap().content, "second");
}

#[test]
fn move_preserves_content_and_created_at() {
    let adapter = memory_adapter();
    let original = seed_memory(&adapter, "a/x", "payload");

    let dest = memory::relocate(&adapter, "a/x", "b/nested/y").unwrap();
    assert_eq!(dest.to_string(), "b/nested/y");

    assert_eq!(
        memory::get(&adapter, "a/x", GetOptions::default()).unwrap_err().code(),
        "MEMORY_NOT_FOUND"
    );
    let moved = memory::get(&adapter, "b/nested/y", GetOptions::default()).unwrap();
    assert_eq!(moved.content, "payload");
    assert_eq!(moved.metadata.created_at, original.metadata.created_at);
}

#[test]
fn move_to_same_path_is_a_no_op() {
    let adapter = memory_adapter();
    seed_memory(&adapter, "a/x", "stay");
    let dest = memory::relocate(&adapter, "a/x", "a//x").unwrap();
    assert_eq!(dest.to_string(), "a/x");
    assert_eq!(memory::get(&adapter, "a/x", GetOptions::default()).unwrap().content, "stay");
}

#[test]
fn move_missing_source_is_not_found() {
    let adapter = memory_adapter();
    assert_eq!(memory::relocate(&adapter, "a/x", "b/y").unwrap_err().code(), "MEMORY_NOT_FOUND");
}

// ---------------------------------------------------------------------------
// remove
// ---------------------------------------------------------------------------

#[test]
fn remove_then_list_omits_memory() {
    let adapter = memory_adapter();
    seed_memory(&adapter, "notes/a", "x");
    seed_memory(&adapter, "notes/b", "y");

    memory::remove(&adapter, "notes/a").unwrap();

    assert_eq!(
        memory::get(&adapter, "notes/a", GetOptions::default()).unwrap_err().code(),
        "MEMORY_NOT_FOUND"
    );
    let listing = memory::list(
        &adapter,
        ListOptions { category: Some("notes".to_string()), ..Default::default() },
    )
    .unwrap();
    assert_eq!(listing.memories.len(), 1);
    assert_eq!(listing.memories[0].path.to_string(), "notes/b");
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

#[test]
fn list_without_category_discovers_roots() {
    let adapter = memory_adapter();
    seed_memory(&adapter, "project/notes/a", "x");
    seed_memory(&adapter, "journal/b", "y");

    let listing = memory::list(&adapter, ListOptions::default()).unwrap();
    assert!(listing.category.is_root());
    let subcats: Vec<String> =
        listing.subcategories.iter().map(|s| s.path.to_string()).collect();
    assert_eq!(subcats, vec!["journal", "project"]);
    let paths: Vec<String> = listing.memories.iter().map(|m| m.path.to_string()).collect();
    assert_eq!(paths, vec!["journal/b", "project/notes/a"]);
}

#[test]
fn list_reports_subcategory_counts() {
    let adapter = memory_adapter();
    seed_memory(&adapter, "project/notes/a", "x");
    seed_memory(&adapter, "project/notes/b", "y");
    adapter.ensure_category(&CategoryPath::parse("project/empty").unwrap()).unwrap();

    let listing = memory::list(
        &adapter,
        ListOptions { category: Some("project".to_string()), ..Default::default() },
    )
    .unwrap();
    // Both subcategories listed; the empty one with count 0, not deleted.
    assert_eq!(listing.subcategories.len(), 2);
    let empty = listing.subcategories.iter().find(|s| s.path.to_string() == "project/empty");
    assert_eq!(empty.unwrap().memory_count, 0);
    let notes = listing.subcategories.iter().find(|s| s.path.to_string() == "project/notes");
    assert_eq!(notes.unwrap().memory_count, 2);
}

#[test]
fn list_skips_expired_and_flags_when_included() {
    let adapter = memory_adapter();
    seed_memory(&adapter, "notes/fresh", "x");
    seed_with(
        &adapter,
        "notes/stale",
        expiring_input("y", "2020-01-01T00:00:00Z"),
        "2019-01-01T00:00:00Z",
    );
    let now = Some(ts("2025-01-01T00:00:00Z"));

    let listing = memory::list(
        &adapter,
        ListOptions { category: Some("notes".to_string()), now, ..Default::default() },
    )
    .unwrap();
    assert_eq!(listing.memories.len(), 1);
    assert!(!listing.memories[0].is_expired);

    let listing = memory::list(
        &adapter,
        ListOptions { category: Some("notes".to_string()), include_expired: true, now },
    )
    .unwrap();
    assert_eq!(listing.memories.len(), 2);
    let stale = listing.memories.iter().find(|m| m.path.to_string() == "notes/stale").unwrap();
    assert!(stale.is_expired);
}

#[test]
fn list_unknown_category_is_not_found() {
    let adapter = memory_adapter();
    let err = memory::list(
        &adapter,
        ListOptions { category: Some("ghost".to_string()), ..Default::default() },
    )
    .unwrap_err();
    assert_eq!(err.code(), "CATEGORY_NOT_FOUND");
}

// ---------------------------------------------------------------------------
// prune (scenario E)
// ---------------------------------------------------------------------------

#[test]
fn prune_dry_run_then_real() {
    let adapter = memory_adapter();
    seed_with(
        &adapter,
        "notes/old-1",
        expiring_input("a", "2020-01-01T00:00:00Z"),
        "2019-01-01T00:00:00Z",
    );
    seed_with(
        &adapter,
        "notes/old-2",
        expiring_input("b", "2020-06-01T00:00:00Z"),
        "2019-01-01T00:00:00Z",
    );
    seed_memory(&adapter, "notes/keep", "c");
    let now = Some(ts("2025-01-01T00:00:00Z"));

    let dry = memory::prune(&adapter, None, PruneOptions { dry_run: true, now }).unwrap();
    assert!(dry.dry_run);
    let dry_paths: Vec<String> = dry.pruned.iter().map(|p| p.path.to_string()).collect();
    assert_eq!(dry_paths, vec!["notes/old-1", "notes/old-2"]);

    // Dry run removed nothing.
    let all = memory::list(
        &adapter,
        ListOptions { include_expired: true, now, ..Default::default() },
    )
    .unwrap();
    assert_eq!(all.memories.len(), 3);

    let real = memory::prune(&adapter, None, PruneOptions { dry_run: false, now }).unwrap();
    let real_paths: Vec<String> = real.pruned.iter().map(|p| p.path.to_string()).collect();
    assert_eq!(real_paths, dry_paths);

    let remaining = memory::list(
        &adapter,
        ListOptions { include_expired: true, now, ..Default::default() },
    )
    .unwrap();
    assert_eq!(remaining.memories.len(), 1);
    assert_eq!(remaining.memories[0].path.to_string(), "notes/keep");
}

#[test]
fn prune_scoped_leaves_other_categories_alone() {
    let adapter = memory_adapter();
    seed_with(
        &adapter,
        "a/old",
        expiring_input("x", "2020-01-01T00:00:00Z"),
        "2019-01-01T00:00:00Z",
    );
    seed_with(
        &adapter,
        "b/old",
        expiring_input("y", "2020-01-01T00:00:00Z"),
        "2019-01-01T00:00:00Z",
    );
    let now = Some(ts("2025-01-01T00:00:00Z"));

    let result = memory::prune(&adapter, Some("a"), PruneOptions { dry_run: false, now }).unwrap();
    assert_eq!(result.pruned.len(), 1);

    let opts = GetOptions { include_expired: true, now };
    assert!(memory::get(&adapter, "b/old", opts).is_ok());
}

// ---------------------------------------------------------------------------
// recent
// ---------------------------------------------------------------------------

#[test]
fn recent_orders_newest_first_and_honors_limit() {
    let adapter = memory_adapter();
    seed_with(&adapter, "notes/first", input("1"), "2025-01-01T00:00:00Z");
    seed_with(&adapter, "notes/second", input("2"), "2025-02-01T00:00:00Z");
    seed_with(&adapter, "notes/third", input("3"), "2025-03-01T00:00:00Z");

    let result = memory::recent(
        &adapter,
        RecentOptions { limit: 2, ..Default::default() },
    )
    .unwrap();
    let paths: Vec<String> = result.memories.iter().map(|m| m.path.to_string()).collect();
    assert_eq!(paths, vec!["notes/third", "notes/second"]);
    // Full content comes back, not just index entries.
    assert_eq!(result.memories[0].content, "3");
}

#[test]
fn recent_with_zero_limit_returns_empty() {
    let adapter = memory_adapter();
    seed_memory(&adapter, "notes/a", "x");
    let result =
        memory::recent(&adapter, RecentOptions { limit: 0, ..Default::default() }).unwrap();
    assert!(result.memories.is_empty());
}

#[test]
fn recent_skips_expired_by_default() {
    let adapter = memory_adapter();
    seed_with(
        &adapter,
        "notes/stale",
        expiring_input("x", "2020-01-01T00:00:00Z"),
        "2019-12-01T00:00:00Z",
    );
    seed_with(&adapter, "notes/fresh", input("y"), "2019-01-01T00:00:00Z");
    let now = Some(ts("2025-01-01T00:00:00Z"));

    let result = memory::recent(&adapter, RecentOptions { now, ..Default::default() }).unwrap();
    let paths: Vec<String> = result.memories.iter().map(|m| m.path.to_string()).collect();
    assert_eq!(paths, vec!["notes/fresh"]);

    let result = memory::recent(
        &adapter,
        RecentOptions { include_expired: true, now, ..Default::default() },
    )
    .unwrap();
    assert_eq!(result.memories.len(), 2);
    assert_eq!(result.memories[0].path.to_string(), "notes/stale");
}

// ---------------------------------------------------------------------------
// Index failure and reindex recovery (scenario F)
// ---------------------------------------------------------------------------

#[test]
fn index_failure_leaves_memory_readable_until_reindex() {
    let adapter = memory_adapter();
    adapter.ensure_category(&CategoryPath::parse("c").unwrap()).unwrap();

    adapter.fail_index_updates(true);
    let err = memory::create(&adapter, "c/m", input("payload"), None).unwrap_err();
    assert_eq!(err.code(), "STORAGE_ERROR");
    assert!(err.to_string().contains("reindex"), "error should instruct a reindex: {err}");
    adapter.fail_index_updates(false);

    // The memory file landed even though the index update failed.
    assert!(memory::get(&adapter, "c/m", GetOptions::default()).is_ok());

    // The index is stale, so listing omits the entry.
    let listing = memory::list(
        &adapter,
        ListOptions { category: Some("c".to_string()), ..Default::default() },
    )
    .unwrap();
    assert!(listing.memories.is_empty());

    // Reindex reconciles index state with the ground truth.
    memory::reindex(&adapter, None).unwrap();
    let listing = memory::list(
        &adapter,
        ListOptions { category: Some("c".to_string()), ..Default::default() },
    )
    .unwrap();
    assert_eq!(listing.memories.len(), 1);
    assert_eq!(listing.memories[0].path.to_string(), "c/m");
}

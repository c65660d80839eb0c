/*! Integration tests for Concord.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - crdt: merge-law tests for the CRDT primitives
 * - store: event store behavior, replay oracle, SQLite backend
 * - manager: entity lifecycle and remote merge semantics
 * - sync: multi-node sync scenarios, watermarks, and status reporting
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("concord=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod crdt;
mod manager;
mod sync;

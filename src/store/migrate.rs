use crate::store::{Store, StoreError};

const VERSION_KEY: &[u8] = b"schema_version";

struct Migration {
    name: &'static str,
    apply: fn(&Store) -> Result<(), StoreError>,
}

/// 迁移列表按版本号顺序排列（下标 + 1 即版本号）。
/// 每个迁移必须幂等：apply 成功但版本号落盘前崩溃时，重启会再跑一次。
const MIGRATIONS: &[Migration] = &[Migration {
    name: "001_initial",
    apply: |_| Ok(()),
}];

pub fn run(store: &Store) -> Result<(), StoreError> {
    let applied = current_version(store)?;

    for (index, migration) in MIGRATIONS.iter().enumerate() {
        let version = (index + 1) as u32;
        if version <= applied {
            tracing::debug!(version, name = migration.name, "Migration already applied");
            continue;
        }

        tracing::info!(version, name = migration.name, "Running migration");
        (migration.apply)(store)?;
        record_version(store, version)?;
        tracing::info!(version, name = migration.name, "Migration complete");
    }

    Ok(())
}

pub fn current_version(store: &Store) -> Result<u32, StoreError> {
    let version = store
        .meta
        .get(VERSION_KEY)?
        .and_then(|raw| raw.as_ref().try_into().ok())
        .map(u32::from_be_bytes)
        .unwrap_or(0);
    Ok(version)
}

pub fn record_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let applied = current_version(store)?;
    if version < applied {
        return Err(StoreError::Migration {
            version,
            message: format!("refusing to downgrade schema from {applied} to {version}"),
        });
    }

    store.meta.insert(VERSION_KEY, &version.to_be_bytes())?;
    Ok(())
}

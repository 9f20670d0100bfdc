pub mod db {
    use anyhow::Result;
    use rusqlite::{OptionalExtension, Transaction};

    // `db_metadata` is a tiny key/value table every db file carries, so
    // migrations know where to start.
    pub fn init_metadata_and_get_version(tx: &Transaction) -> Result<i32> {
        tx.execute(
            "CREATE TABLE IF NOT EXISTS db_metadata (
                key   TEXT PRIMARY KEY NOT NULL UNIQUE,
                value TEXT
            );",
            (),
        )?;
        let version: Option<String> = tx
            .query_row(
                "SELECT value FROM db_metadata WHERE key = 'version';",
                (),
                |row| row.get(0),
            )
            .optional()?;
        match version {
            None => Ok(0),
            Some(version) => Ok(version.parse()?),
        }
    }

    pub fn set_version_in_metadata(tx: &Transaction, version: i32) -> Result<()> {
        tx.execute(
            "INSERT OR REPLACE INTO db_metadata (key, value) VALUES ('version', ?1);",
            (version.to_string(),),
        )?;
        Ok(())
    }
}

use rusqlite::{params, Connection, OptionalExtension, Result};

/// Records that a client-generated id now has a server identity. Re-setting
/// the same pair is a no-op. A different server id for an existing client id
/// overwrites; that only happens if the server retried a create, and it must
/// not corrupt state.
pub fn set_mapping(conn: &Connection, client_id: &str, server_id: &str) -> Result<()> {
    conn.execute(
        r#"
INSERT INTO id_map (client_id, server_id)
VALUES (?1, ?2)
ON CONFLICT(client_id) DO UPDATE SET server_id = excluded.server_id
"#,
        params![client_id, server_id],
    )?;
    Ok(())
}

pub fn get_mapping(conn: &Connection, client_id: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT server_id FROM id_map WHERE client_id = ?1",
        params![client_id],
        |row| row.get(0),
    )
    .optional()
}

#![cfg(feature = "rusqlite")]

use sqlprof::driver::rusqlite::SqliteConnection;

pub fn setup_db() -> SqliteConnection {
    let conn = SqliteConnection::open_in_memory().expect("Failed to create in-memory database");
    create_tables(&conn);
    conn
}

pub fn create_tables(conn: &SqliteConnection) {
    conn.inner()
        .execute_batch(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                score REAL,
                avatar BLOB
            );",
        )
        .expect("Failed to create tables");
}

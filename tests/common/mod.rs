#![allow(dead_code)]

use sqlair::{Record, DB};

#[derive(Record, Default, Debug, Clone, PartialEq)]
pub struct Person {
    #[db("id")]
    pub id: i64,
    #[db("name")]
    pub name: String,
    #[db("postcode,omitempty")]
    pub postcode: String,
}

#[derive(Record, Default, Debug, Clone, PartialEq)]
pub struct Address {
    #[db("id")]
    pub id: i64,
    #[db("district")]
    pub district: String,
    #[db("street")]
    pub street: String,
}

pub fn person_and_address_db() -> DB {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE person (
            name text,
            id integer,
            postcode text,
            email text
        );
        CREATE TABLE address (
            id integer,
            district text,
            street text
        );
        INSERT INTO person VALUES ('Fred', 30, '1000', 'fred@email.com');
        INSERT INTO person VALUES ('Mark', 20, '1500', 'mark@email.com');
        INSERT INTO person VALUES ('Mary', NULL, '3500', 'mary@email.com');
        INSERT INTO person VALUES ('James', 35, NULL, 'james@email.com');
        INSERT INTO address VALUES (25, 'Happy Land', 'Main Street');
        INSERT INTO address VALUES (30, 'Sad World', 'Church Road');
        INSERT INTO address VALUES (10, 'Ambivilent Commons', 'Station Lane');",
    )
    .unwrap();
    DB::new(conn)
}

pub fn empty_person_db() -> DB {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE person (
            name text,
            id integer,
            postcode text,
            email text
        );",
    )
    .unwrap();
    DB::new(conn)
}

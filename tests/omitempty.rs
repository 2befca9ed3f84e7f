//! NULL handling on scan: zeroing, omit-empty preservation, and `Option`
//! members.

use sqlair::{Record, Statement, Value, M};

mod common;
use common::{person_and_address_db, Person};

fn key(id: i64) -> M {
    [("id", Value::Integer(id))].into_iter().collect()
}

#[test]
fn null_into_omit_empty_member_keeps_prior_content() {
    let db = person_and_address_db();
    let stmt = Statement::prepare(
        "SELECT &Person.* FROM person WHERE id = $M.id",
        &[&Person::default(), &M::new()],
    )
    .unwrap();
    // James's postcode is NULL; the member is tagged omitempty.
    let mut person = Person {
        id: 0,
        name: String::new(),
        postcode: "6000".into(),
    };
    db.query(&stmt, &[&key(35)]).get(&mut [&mut person]).unwrap();
    assert_eq!(
        person,
        Person {
            id: 35,
            name: "James".into(),
            postcode: "6000".into()
        }
    );
}

#[test]
fn null_into_plain_member_zeroes_it() {
    let db = person_and_address_db();
    let stmt = Statement::prepare(
        "SELECT &Person.* FROM person WHERE name = $M.name",
        &[&Person::default(), &M::new()],
    )
    .unwrap();
    // Mary's id is NULL; the member has no omitempty.
    let mut person = Person {
        id: 999,
        name: "stale".into(),
        postcode: String::new(),
    };
    let name: M = [("name", Value::Text("Mary".into()))].into_iter().collect();
    db.query(&stmt, &[&name]).get(&mut [&mut person]).unwrap();
    assert_eq!(
        person,
        Person {
            id: 0,
            name: "Mary".into(),
            postcode: "3500".into()
        }
    );
}

#[derive(Record, Default, Debug, Clone, PartialEq)]
struct Contact {
    #[db("id")]
    id: i64,
    #[db("email")]
    email: Option<String>,
}

#[test]
fn null_into_option_member_is_none() {
    let db = person_and_address_db();
    db.query(
        &Statement::prepare(
            "UPDATE person SET email = NULL WHERE id = $M.id",
            &[&M::new()],
        )
        .unwrap(),
        &[&key(30)],
    )
    .run()
    .unwrap();

    let stmt = Statement::prepare(
        "SELECT &Contact.* FROM person WHERE id = $M.id",
        &[&Contact::default(), &M::new()],
    )
    .unwrap();
    let mut contact = Contact {
        id: 0,
        email: Some("stale@example.com".into()),
    };
    db.query(&stmt, &[&key(30)]).get(&mut [&mut contact]).unwrap();
    assert_eq!(contact, Contact { id: 30, email: None });

    let mut contact = Contact::default();
    db.query(&stmt, &[&key(20)]).get(&mut [&mut contact]).unwrap();
    assert_eq!(
        contact,
        Contact {
            id: 20,
            email: Some("mark@email.com".into())
        }
    );
}

#[test]
fn omit_empty_input_still_binds() {
    let db = person_and_address_db();
    let stmt = Statement::prepare(
        "SELECT id AS &M.id FROM person WHERE postcode = $Person.postcode",
        &[&Person::default(), &M::new()],
    )
    .unwrap();
    let probe = Person {
        postcode: "1500".into(),
        ..Person::default()
    };
    let mut result = M::new();
    db.query(&stmt, &[&probe]).get(&mut [&mut result]).unwrap();
    assert_eq!(result.get("id"), Some(&Value::Integer(20)));
}

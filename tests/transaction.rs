use sqlair::{Error, Statement, TxBehavior, TxOptions, Value, M};

mod common;
use common::{empty_person_db, person_and_address_db, Person};

fn insert_stmt() -> Statement {
    Statement::prepare(
        "INSERT INTO person (*) VALUES ($Person.*)",
        &[&Person::default()],
    )
    .unwrap()
}

fn select_by_id_stmt() -> Statement {
    Statement::prepare("SELECT id AS &M.id FROM person WHERE id = $M.id", &[&M::new()]).unwrap()
}

fn fred() -> Person {
    Person {
        id: 30,
        name: "Fred".into(),
        postcode: "1000".into(),
    }
}

fn key(id: i64) -> M {
    [("id", Value::Integer(id))].into_iter().collect()
}

#[test]
fn commit_publishes_writes() {
    let db = empty_person_db();
    let insert = insert_stmt();
    let check = select_by_id_stmt();

    let mut tx = db.begin(TxOptions::default()).unwrap();
    tx.query(&insert, &[&fred()]).run().unwrap();
    tx.commit().unwrap();

    let mut result = M::new();
    db.query(&check, &[&key(30)]).get(&mut [&mut result]).unwrap();
    assert_eq!(result.get("id"), Some(&Value::Integer(30)));
}

#[test]
fn rollback_discards_writes() {
    let db = empty_person_db();
    let insert = insert_stmt();
    let check = select_by_id_stmt();

    let mut tx = db.begin(TxOptions::default()).unwrap();
    tx.query(&insert, &[&fred()]).run().unwrap();
    tx.rollback().unwrap();

    let mut result = M::new();
    let err = db
        .query(&check, &[&key(30)])
        .get(&mut [&mut result])
        .unwrap_err();
    assert!(matches!(err, Error::NoRows), "got: {err}");
}

#[test]
fn drop_without_commit_rolls_back() {
    let db = empty_person_db();
    let insert = insert_stmt();
    let check = select_by_id_stmt();

    {
        let tx = db.begin(TxOptions::default()).unwrap();
        tx.query(&insert, &[&fred()]).run().unwrap();
    }

    let mut result = M::new();
    let err = db
        .query(&check, &[&key(30)])
        .get(&mut [&mut result])
        .unwrap_err();
    assert!(matches!(err, Error::NoRows), "got: {err}");
}

#[test]
fn done_transaction_rejects_everything() {
    let db = empty_person_db();
    let insert = insert_stmt();

    let mut tx = db.begin(TxOptions::default()).unwrap();
    tx.commit().unwrap();

    let err = tx.commit().unwrap_err();
    assert!(matches!(err, Error::TxDone), "got: {err}");
    let err = tx.rollback().unwrap_err();
    assert!(matches!(err, Error::TxDone), "got: {err}");
    let err = tx.query(&insert, &[&fred()]).run().unwrap_err();
    assert!(matches!(err, Error::TxDone), "got: {err}");
}

#[test]
fn read_only_transaction_rejects_writes() {
    let db = person_and_address_db();
    let insert = insert_stmt();
    let select = Statement::prepare(
        "SELECT &Person.* FROM person WHERE id = $M.id",
        &[&Person::default(), &M::new()],
    )
    .unwrap();

    let mut tx = db
        .begin(TxOptions {
            behavior: TxBehavior::Deferred,
            read_only: true,
        })
        .unwrap();

    let mut person = Person::default();
    tx.query(&select, &[&key(30)]).get(&mut [&mut person]).unwrap();
    assert_eq!(person.name, "Fred");

    let other = Person {
        id: 77,
        name: "Eve".into(),
        postcode: "2000".into(),
    };
    let err = tx.query(&insert, &[&other]).run().unwrap_err();
    assert!(err.driver_error().is_some(), "got: {err}");
    tx.rollback().unwrap();

    // The connection accepts writes again once the transaction is gone.
    db.query(&insert, &[&other]).run().unwrap();
}

#[test]
fn immediate_transaction_queries() {
    let db = person_and_address_db();
    let select = Statement::prepare(
        "SELECT &Person.* FROM person WHERE id = $M.id",
        &[&Person::default(), &M::new()],
    )
    .unwrap();

    let mut tx = db
        .begin(TxOptions {
            behavior: TxBehavior::Immediate,
            read_only: false,
        })
        .unwrap();
    let mut person = Person::default();
    tx.query(&select, &[&key(30)]).get(&mut [&mut person]).unwrap();
    tx.commit().unwrap();
    assert_eq!(person.id, 30);
}

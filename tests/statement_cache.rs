//! Lifecycle of the statement/database cache. Kept as a single sequential
//! test: the registry is process-wide and other tests in this binary would
//! race the counters.

use sqlair::{cache_stats, Statement, Value, M};

mod common;
use common::{person_and_address_db, Person};

#[test]
fn cache_tracks_and_releases_both_sides() {
    let (stmts_before, dbs_before) = cache_stats();

    let db = person_and_address_db();
    let other = person_and_address_db();
    let (_, dbs) = cache_stats();
    assert_eq!(dbs, dbs_before + 2);

    let stmt = Statement::prepare(
        "SELECT &Person.* FROM person WHERE id = $M.id",
        &[&Person::default(), &M::new()],
    )
    .unwrap();
    let key: M = [("id", Value::Integer(30))].into_iter().collect();

    // First use on each database registers the pairing; repeats do not
    // grow it.
    for _ in 0..3 {
        let mut person = Person::default();
        db.query(&stmt, &[&key]).get(&mut [&mut person]).unwrap();
        other.query(&stmt, &[&key]).get(&mut [&mut person]).unwrap();
    }
    let (stmts, _) = cache_stats();
    assert_eq!(stmts, stmts_before + 1);

    // Dropping a database forgets it but keeps the statement usable on
    // the other.
    drop(other);
    let (_, dbs) = cache_stats();
    assert_eq!(dbs, dbs_before + 1);
    let mut person = Person::default();
    db.query(&stmt, &[&key]).get(&mut [&mut person]).unwrap();
    assert_eq!(person.id, 30);

    // Dropping the statement discards its driver handles and its rows in
    // the registry; the database still serves other statements.
    drop(stmt);
    let (stmts, _) = cache_stats();
    assert_eq!(stmts, stmts_before);

    let fresh = Statement::prepare("SELECT &Person.* FROM person", &[&Person::default()]).unwrap();
    let rows: Vec<(Person,)> = db.query(&fresh, &[]).get_all().unwrap();
    assert_eq!(rows.len(), 4);

    drop(db);
    let (_, dbs) = cache_stats();
    assert_eq!(dbs, dbs_before);
}

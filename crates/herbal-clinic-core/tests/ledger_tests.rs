//! Visit ledger integration tests.

use herbal_clinic_core::db::{DbError, Session};
use herbal_clinic_core::models::{CatalogEntry, CatalogItemRef, LineDraft, Party, PrescriptionDraft};
use herbal_clinic_core::{Catalog, Ledger, PartyDirectory};

fn setup() -> (Session, i64) {
    let session = Session::open_in_memory().unwrap();
    let party_id = PartyDirectory::new(&session)
        .save(&Party::new("王小明"))
        .unwrap();
    (session, party_id)
}

fn make_lines(names: &[(&str, u32)]) -> Vec<LineDraft> {
    names
        .iter()
        .map(|(name, quantity)| LineDraft::new(*name, format!("{name} 組成"), *quantity, "包"))
        .collect()
}

/// Abort any insert of a line named BOOM, after the visit row is written.
fn install_failing_trigger(session: &Session) {
    session
        .execute_batch(
            r#"
            CREATE TEMP TRIGGER fail_boom_line
            BEFORE INSERT ON prescriptions
            WHEN NEW.prescription_name = 'BOOM'
            BEGIN
                SELECT RAISE(ABORT, 'forced failure');
            END;
            "#,
        )
        .unwrap();
}

#[test]
fn test_stored_lines_match_draft_order_and_quantity() {
    let (session, party_id) = setup();
    let ledger = Ledger::new(&session);

    let lines = make_lines(&[("四物湯", 2), ("甘草", 5), ("當歸", 1), ("黃耆", 3)]);
    let visit_id = ledger
        .store_visit(party_id, &lines, Some(500.0), "月經不調", "血虛")
        .unwrap();

    let stored = ledger.load_lines_for_visit(visit_id).unwrap();
    assert_eq!(stored.len(), lines.len());
    for (stored, drafted) in stored.iter().zip(&lines) {
        assert_eq!(stored.name, drafted.name);
        assert_eq!(stored.composition, drafted.composition);
        assert_eq!(stored.quantity, i64::from(drafted.quantity));
        assert_eq!(stored.unit, drafted.unit);
        assert_eq!(stored.visit_id, Some(visit_id));
        assert_eq!(stored.party_id, party_id);
    }
}

#[test]
fn test_failed_line_insert_rolls_back_visit() {
    let (session, party_id) = setup();
    let ledger = Ledger::new(&session);
    install_failing_trigger(&session);

    let lines = make_lines(&[("甘草", 1), ("BOOM", 1), ("當歸", 1)]);
    let err = ledger
        .store_visit(party_id, &lines, None, "", "")
        .unwrap_err();
    assert!(matches!(err, DbError::Storage(_)));

    // Neither the visit nor the first line survived
    assert!(ledger.load_visits(party_id).unwrap().is_empty());
    assert!(ledger.load_latest_lines(party_id).unwrap().is_empty());
    assert_eq!(ledger.count_visits(party_id).unwrap(), 0);

    // The session is usable afterwards
    let visit_id = ledger
        .store_visit(party_id, &make_lines(&[("甘草", 1)]), None, "", "")
        .unwrap();
    assert_eq!(ledger.load_visits(party_id).unwrap()[0].id, visit_id);
}

#[test]
fn test_party_delete_cascades() {
    let (session, party_id) = setup();
    let directory = PartyDirectory::new(&session);
    let ledger = Ledger::new(&session);

    let other_id = directory.save(&Party::new("李四")).unwrap();
    ledger
        .store_visit(party_id, &make_lines(&[("甘草", 1)]), None, "", "")
        .unwrap();
    let kept_visit = ledger
        .store_visit(other_id, &make_lines(&[("當歸", 1)]), None, "", "")
        .unwrap();

    assert!(directory.delete(party_id).unwrap());

    let ids: Vec<Option<i64>> = directory.list_all().unwrap().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![Some(other_id)]);
    assert!(ledger.load_visits(party_id).unwrap().is_empty());
    assert!(ledger.load_latest_lines(party_id).unwrap().is_empty());

    let visit_parties: Vec<i64> = session
        .query("SELECT customer_id FROM records", [], |row| row.get(0))
        .unwrap();
    assert_eq!(visit_parties, vec![other_id]);
    assert_eq!(ledger.load_lines_for_visit(kept_visit).unwrap().len(), 1);
}

#[test]
fn test_profile_counts_visits() {
    let (session, party_id) = setup();
    let ledger = Ledger::new(&session);

    for _ in 0..3 {
        ledger
            .store_visit(party_id, &make_lines(&[("甘草", 1)]), None, "", "")
            .unwrap();
    }

    let profile = PartyDirectory::new(&session).fetch(party_id).unwrap();
    assert_eq!(profile.visit_count, 3);
    assert_eq!(profile.next_visit_number(), 4);

    let ordinals: Vec<u32> = ledger
        .load_visits(party_id)
        .unwrap()
        .iter()
        .map(|v| v.ordinal)
        .collect();
    assert_eq!(ordinals, vec![3, 2, 1]);
}

#[test]
fn test_history_unchanged_by_catalog_edit() {
    let (session, party_id) = setup();
    let formulas = Catalog::formulas(&session);
    let ledger = Ledger::new(&session);

    let mut entry = CatalogEntry::new("F100", "桂枝湯");
    entry.composition = Some("桂枝 芍藥 甘草 生薑 大棗".into());
    formulas.save(&entry).unwrap();

    let mut draft = PrescriptionDraft::new();
    draft.add(Catalog::line_for(&session, &CatalogItemRef::Formula("F100".into()), 1).unwrap());
    let visit_id = ledger
        .store_visit(party_id, draft.lines(), None, "", "")
        .unwrap();

    entry.composition = Some("桂枝 白芍".into());
    formulas.save(&entry).unwrap();

    let stored = ledger.load_lines_for_visit(visit_id).unwrap();
    assert_eq!(stored[0].composition, "桂枝 芍藥 甘草 生薑 大棗");
}

#[test]
fn test_carry_forward_merges_into_draft() {
    let (session, party_id) = setup();
    let ledger = Ledger::new(&session);

    let previous = ledger
        .store_visit(party_id, &make_lines(&[("甘草", 2), ("當歸", 1)]), None, "", "")
        .unwrap();

    let mut draft = PrescriptionDraft::new();
    draft.add(LineDraft::new("甘草", "甘草 組成", 3, "包"));
    assert!(draft.absorb(ledger.carry_forward(previous).unwrap()));

    let lines: Vec<(&str, u32)> = draft
        .lines()
        .iter()
        .map(|l| (l.name.as_str(), l.quantity))
        .collect();
    assert_eq!(lines, vec![("甘草", 5), ("當歸", 1)]);

    // Storing the carried draft leaves the source visit untouched
    ledger.store_visit(party_id, draft.lines(), None, "", "").unwrap();
    assert_eq!(ledger.load_lines_for_visit(previous).unwrap().len(), 2);
}

//! Integration tests for `SqliteStore` and the stage pipeline against an
//! in-memory database.

use std::collections::HashSet;

use chrono::NaiveDate;
use firmograph_core::{
  entity::{
    DetailKind, DetailValue, DimensionKind, DimensionValue, Location, SimilarCompany,
    SizeRange, Stage,
  },
  normalize::{NO_INDUSTRY, NO_LINK, NO_LOCATION, NO_NAME, unknown_date},
  pipeline::{Pipeline, PipelineOptions},
  staging::{NewStagingRecord, PayloadField},
  store::NormalizedStore,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
  SqliteStore,
  encode::{dimension_params, dimension_table, encode_uuid},
  store::{insert_or_fetch, resolve_sql},
};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn pipeline(s: &SqliteStore) -> Pipeline<SqliteStore> {
  Pipeline::new(s.clone(), PipelineOptions::default())
}

async fn stage(s: &SqliteStore, doc: serde_json::Value) -> Uuid {
  let input = NewStagingRecord::from_profile(doc).unwrap();
  s.stage_record(input).await.unwrap().company_id
}

fn austin() -> Location {
  Location {
    country:       "US".into(),
    city:          Some("Austin".into()),
    postal_code:   None,
    address_line1: None,
    state:         None,
    is_hq:         false,
  }
}

// ─── Staging ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stage_and_list_roundtrip() {
  let s = store().await;
  let id = stage(
    &s,
    json!({
      "name": "Initech",
      "founded_year": 1996,
      "industry": "Software",
      "specialities": ["TPS reports"],
    }),
  )
  .await;

  let records = s.list_staging().await.unwrap();
  assert_eq!(records.len(), 1);
  let r = &records[0];
  assert_eq!(r.company_id, id);
  assert_eq!(r.profile.name.as_deref(), Some("Initech"));
  assert_eq!(r.profile.founded_year, Some(1996));
  assert_eq!(r.payload(PayloadField::Industry), Some("Software"));
  assert_eq!(r.payload(PayloadField::Specialities), Some(r#"["TPS reports"]"#));
  assert_eq!(r.payload(PayloadField::Locations), None);
}

#[tokio::test]
async fn undecodable_columns_and_rows_do_not_sink_the_batch() {
  let s = store().await;
  let good = stage(&s, json!({"name": "Good", "specialities": ["Clean"]})).await;

  let loose = Uuid::new_v4();
  let loose_id = encode_uuid(loose);
  s.conn
    .call(move |conn| {
      let now = chrono::Utc::now().to_rfc3339();
      // Wrong types in a profile column and a payload column.
      conn.execute(
        "INSERT INTO company (company_id, staged_at, name, founded_year, specialities, industry)
         VALUES (?1, ?2, 'Loose', 'circa 1999', '[\"Raw\"]', X'FF')",
        rusqlite::params![loose_id, now],
      )?;
      // An identity that cannot be decoded at all.
      conn.execute(
        "INSERT INTO company (company_id, staged_at, specialities)
         VALUES ('not-a-uuid', ?1, '[\"Ghost\"]')",
        rusqlite::params![now],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let records = s.list_staging().await.unwrap();
  assert_eq!(records.len(), 2);
  let loose_record = records.iter().find(|r| r.company_id == loose).unwrap();
  assert_eq!(loose_record.profile.name.as_deref(), Some("Loose"));
  assert_eq!(loose_record.profile.founded_year, None);
  assert_eq!(loose_record.payload(PayloadField::Industry), None);
  assert_eq!(loose_record.payload(PayloadField::Specialities), Some(r#"["Raw"]"#));

  pipeline(&s).run_all().await.unwrap();

  let specialties: HashSet<_> = s
    .dimensions(DimensionKind::Specialty)
    .await
    .unwrap()
    .into_iter()
    .map(|d| d.value)
    .collect();
  assert_eq!(
    specialties,
    HashSet::from([
      DimensionValue::Specialty("Clean".into()),
      DimensionValue::Specialty("Raw".into()),
    ])
  );
  let owners: HashSet<_> = s
    .links(DimensionKind::Specialty)
    .await
    .unwrap()
    .into_iter()
    .map(|l| l.company_id)
    .collect();
  assert_eq!(owners, HashSet::from([good, loose]));
}

// ─── Dimension resolver ──────────────────────────────────────────────────────

#[tokio::test]
async fn resolve_is_idempotent() {
  let s = store().await;

  let a = s.resolve(DimensionValue::Specialty("Payments".into())).await.unwrap();
  let b = s.resolve(DimensionValue::Specialty("Payments".into())).await.unwrap();
  let c = s.resolve(DimensionValue::Specialty("Lending".into())).await.unwrap();

  assert_eq!(a, b);
  assert_ne!(a, c);
  assert_eq!(s.dimensions(DimensionKind::Specialty).await.unwrap().len(), 2);
}

#[tokio::test]
async fn resolve_matches_absent_location_parts() {
  let s = store().await;

  let a = s.resolve(DimensionValue::Location(austin())).await.unwrap();
  let b = s.resolve(DimensionValue::Location(austin())).await.unwrap();
  assert_eq!(a, b);

  let hq = Location { is_hq: true, ..austin() };
  let c = s.resolve(DimensionValue::Location(hq)).await.unwrap();
  assert_ne!(a, c);

  let dims = s.dimensions(DimensionKind::Location).await.unwrap();
  assert_eq!(dims.len(), 2);
  assert_eq!(dims[0].value, DimensionValue::Location(austin()));
}

#[tokio::test]
async fn location_natural_key_is_enforced_in_storage() {
  let s = store().await;
  s.resolve(DimensionValue::Location(austin())).await.unwrap();

  let err = s
    .conn
    .call(|conn| {
      conn.execute(
        "INSERT INTO location (location_id, country, city, is_hq)
         VALUES ('dup', 'US', 'Austin', 0)",
        [],
      )?;
      Ok(())
    })
    .await
    .unwrap_err();
  assert!(err.to_string().contains("UNIQUE"), "{err}");
}

#[tokio::test]
async fn concurrent_resolve_mints_one_row() {
  let s = store().await;
  let value = DimensionValue::SimilarCompany(SimilarCompany {
    name:         "Globex".into(),
    linkedin_url: "https://www.linkedin.com/company/globex".into(),
    industry:     "Utilities".into(),
    location:     "Springfield".into(),
  });

  let mut tasks = tokio::task::JoinSet::new();
  for _ in 0..16 {
    let s = s.clone();
    let value = value.clone();
    tasks.spawn(async move { s.resolve(value).await });
  }

  let mut ids = HashSet::new();
  while let Some(joined) = tasks.join_next().await {
    ids.insert(joined.unwrap().unwrap());
  }

  assert_eq!(ids.len(), 1);
  assert_eq!(s.dimensions(DimensionKind::SimilarCompany).await.unwrap().len(), 1);
}

#[tokio::test]
async fn resolve_recovers_from_a_lost_insert_race() {
  let s = store().await;
  let value = DimensionValue::Industry("Fintech".into());
  let winner = s.resolve(value.clone()).await.unwrap();

  // The insert half of a resolve whose lookup ran before the winner committed.
  let (select_sql, insert_sql) = resolve_sql(dimension_table(DimensionKind::Industry));
  let params = dimension_params(&value);
  let id = s
    .conn
    .call(move |conn| Ok(insert_or_fetch(conn, &select_sql, &insert_sql, &params)?))
    .await
    .unwrap();

  assert_eq!(id, Some(encode_uuid(winner)));
  assert_eq!(s.dimensions(DimensionKind::Industry).await.unwrap().len(), 1);
  assert_eq!(s.resolve(value).await.unwrap(), winner);
}

#[tokio::test]
async fn stores_sharing_a_file_mint_one_row_per_value() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("firmograph.db");
  let a = SqliteStore::open(&path).await.unwrap();
  let b = SqliteStore::open(&path).await.unwrap();

  let mut tasks = tokio::task::JoinSet::new();
  for i in 0..16 {
    let s = if i % 2 == 0 { a.clone() } else { b.clone() };
    tasks.spawn(async move {
      s.resolve(DimensionValue::CompanyType("PUBLIC_COMPANY".into())).await
    });
  }

  let mut ids = HashSet::new();
  while let Some(joined) = tasks.join_next().await {
    ids.insert(joined.unwrap().unwrap());
  }

  assert_eq!(ids.len(), 1);
  assert_eq!(a.dimensions(DimensionKind::CompanyType).await.unwrap().len(), 1);
  assert_eq!(b.dimensions(DimensionKind::CompanyType).await.unwrap().len(), 1);
}

#[tokio::test]
async fn size_range_roundtrips_by_label() {
  let s = store().await;
  let id = s
    .resolve(DimensionValue::SizeRange(SizeRange::From10001))
    .await
    .unwrap();

  let dims = s.dimensions(DimensionKind::SizeRange).await.unwrap();
  assert_eq!(dims.len(), 1);
  assert_eq!(dims[0].dimension_id, id);
  assert_eq!(dims[0].value, DimensionValue::SizeRange(SizeRange::From10001));
}

// ─── Link builder ────────────────────────────────────────────────────────────

#[tokio::test]
async fn link_is_idempotent() {
  let s = store().await;
  let company = stage(&s, json!({"name": "Hooli"})).await;
  let industry = s.resolve(DimensionValue::Industry("Internet".into())).await.unwrap();

  assert!(s.link(company, DimensionKind::Industry, industry).await.unwrap());
  assert!(!s.link(company, DimensionKind::Industry, industry).await.unwrap());

  let links = s.links(DimensionKind::Industry).await.unwrap();
  assert_eq!(links.len(), 1);
  assert_eq!(links[0].company_id, company);
  assert_eq!(links[0].dimension_id, industry);
}

#[tokio::test]
async fn link_to_unknown_company_errors() {
  let s = store().await;
  let industry = s.resolve(DimensionValue::Industry("Internet".into())).await.unwrap();

  let err = s
    .link(Uuid::new_v4(), DimensionKind::Industry, industry)
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Database(_)));
}

// ─── Detail builder ──────────────────────────────────────────────────────────

#[tokio::test]
async fn add_detail_always_appends() {
  let s = store().await;
  let a = stage(&s, json!({"name": "A"})).await;
  let b = stage(&s, json!({"name": "B"})).await;

  let detail = DetailValue::AffiliatedCompany(firmograph_core::entity::AffiliatedCompany {
    name:         "Shared Sub".into(),
    linkedin_url: NO_LINK.into(),
    industry:     "Retail".into(),
    location:     "Berlin".into(),
  });

  let first = s.add_detail(a, detail.clone()).await.unwrap();
  let second = s.add_detail(b, detail.clone()).await.unwrap();
  let third = s.add_detail(a, detail.clone()).await.unwrap();
  assert_ne!(first, second);
  assert_ne!(first, third);

  let rows = s.details(DetailKind::AffiliatedCompany).await.unwrap();
  assert_eq!(rows.len(), 3);
  assert!(rows.iter().all(|r| r.value == detail));
  assert_eq!(rows.iter().filter(|r| r.company_id == a).count(), 2);
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pipeline_normalizes_every_field() {
  let s = store().await;
  let acme = stage(
    &s,
    json!({
      "name": "Acme",
      "company_size": [51, 200],
      "company_type": " PRIVATELY_HELD ",
      "industry": "Manufacturing",
      "specialities": ["Anvils", " anvils ", "Anvils", "", "Rockets"],
      "locations": [
        {"country": "US", "city": "Austin"},
        {"country": "US", "city": "Austin", "is_hq": "true", "line_1": "1 Main St"},
        {"city": "Nowhere"}
      ],
      "updates": [{"text": "We are hiring"}],
      "affiliated_companies": [{"name": "Acme Labs", "industry": "Research"}],
      "similar_companies": [{"name": "Globex", "link": "https://li.example/globex"}],
    }),
  )
  .await;
  let odd = stage(
    &s,
    json!({
      "name": "Oddball",
      "company_size": [7, 9],
      "locations": [{"country": "US", "city": "Austin"}],
      "similar_companies": [{"name": "Globex", "link": "https://li.example/globex"}],
    }),
  )
  .await;

  let reports = pipeline(&s).run_all().await.unwrap();
  assert_eq!(reports.len(), Stage::all().len());

  // Size: (51, 200) is bucketed; (7, 9) is dropped silently.
  let sizes = s.dimensions(DimensionKind::SizeRange).await.unwrap();
  assert_eq!(sizes.len(), 1);
  assert_eq!(sizes[0].value, DimensionValue::SizeRange(SizeRange::From51To200));
  let size_links = s.links(DimensionKind::SizeRange).await.unwrap();
  assert_eq!(size_links.len(), 1);
  assert_eq!(size_links[0].company_id, acme);
  let size_report = reports.iter().find(|r| r.stage == Stage::SizeRange).unwrap();
  assert_eq!(size_report.dropped, 1);

  // Specialties: trimmed, blank dropped, case preserved, linked once each.
  let specialties: HashSet<_> = s
    .dimensions(DimensionKind::Specialty)
    .await
    .unwrap()
    .into_iter()
    .map(|d| d.value)
    .collect();
  assert_eq!(
    specialties,
    HashSet::from([
      DimensionValue::Specialty("Anvils".into()),
      DimensionValue::Specialty("anvils".into()),
      DimensionValue::Specialty("Rockets".into()),
    ])
  );
  assert_eq!(s.links(DimensionKind::Specialty).await.unwrap().len(), 3);

  // Company type is trimmed.
  let types = s.dimensions(DimensionKind::CompanyType).await.unwrap();
  assert_eq!(types[0].value, DimensionValue::CompanyType("PRIVATELY_HELD".into()));

  // Locations: the plain Austin value is shared by both companies; the HQ
  // variant is distinct; the country-less entry is not admitted.
  let locations = s.dimensions(DimensionKind::Location).await.unwrap();
  assert_eq!(locations.len(), 2);
  let plain = locations
    .iter()
    .find(|d| d.value == DimensionValue::Location(austin()))
    .unwrap();
  let location_links = s.links(DimensionKind::Location).await.unwrap();
  assert_eq!(location_links.len(), 3);
  let plain_owners: HashSet<_> = location_links
    .iter()
    .filter(|l| l.dimension_id == plain.dimension_id)
    .map(|l| l.company_id)
    .collect();
  assert_eq!(plain_owners, HashSet::from([acme, odd]));

  // Similar companies dedupe across records.
  assert_eq!(s.dimensions(DimensionKind::SimilarCompany).await.unwrap().len(), 1);
  assert_eq!(s.links(DimensionKind::SimilarCompany).await.unwrap().len(), 2);

  // Update defaults.
  let updates = s.details(DetailKind::Update).await.unwrap();
  assert_eq!(updates.len(), 1);
  let DetailValue::Update(u) = &updates[0].value else {
    panic!("expected update");
  };
  assert_eq!(updates[0].company_id, acme);
  assert_eq!(u.article_link, NO_LINK);
  assert_eq!(u.image, "");
  assert_eq!(u.posted_on, NaiveDate::from_ymd_opt(1900, 1, 1).unwrap());
  assert_eq!(u.total_likes, 0);
  assert_eq!(u.update_text, "We are hiring");

  // Affiliated company placeholders.
  let affiliated = s.details(DetailKind::AffiliatedCompany).await.unwrap();
  let DetailValue::AffiliatedCompany(a) = &affiliated[0].value else {
    panic!("expected affiliated company");
  };
  assert_eq!(a.linkedin_url, NO_LINK);
  assert_eq!(a.location, "No Location Provided");
}

#[tokio::test]
async fn rerun_is_idempotent_for_dimensions_but_appends_details() {
  let s = store().await;
  stage(
    &s,
    json!({
      "specialities": ["Search"],
      "industry": "Internet",
      "company_size": [10001, null],
      "locations": [{"country": "US", "city": "Mountain View", "is_hq": true}],
      "updates": [{"text": "Hello", "posted_on": {"year": 2024}}],
      "affiliated_companies": [{"name": "Sub"}],
    }),
  )
  .await;

  let p = pipeline(&s);
  let first = p.run_all().await.unwrap();
  let counts_after_first = s.table_counts().await.unwrap();

  let second = p.run_all().await.unwrap();
  let counts_after_second = s.table_counts().await.unwrap();

  for kind in DimensionKind::all() {
    let t = crate::encode::dimension_table(kind);
    assert_eq!(counts_after_first[t.table], counts_after_second[t.table], "{kind}");
    assert_eq!(
      counts_after_first[t.link_table], counts_after_second[t.link_table],
      "{kind}"
    );
  }
  assert_eq!(counts_after_first["company_update"], 1);
  assert_eq!(counts_after_second["company_update"], 2);
  assert_eq!(counts_after_second["affiliated_company"], 2);

  let links_second: usize = second.iter().map(|r| r.links_created).sum();
  let links_first: usize = first.iter().map(|r| r.links_created).sum();
  assert_eq!(links_first, 4);
  assert_eq!(links_second, 0);
}

#[tokio::test]
async fn malformed_payload_is_skipped() {
  let s = store().await;
  let broken = NewStagingRecord::default()
    .with_payload(PayloadField::Specialities, "[\"unterminated")
    .with_payload(PayloadField::CompanySize, "{\"low\": 1}")
    .with_payload(PayloadField::Industry, "Banking");
  let broken_id = s.stage_record(broken).await.unwrap().company_id;
  stage(&s, json!({"specialities": ["Credit"]})).await;

  let reports = pipeline(&s).run_all().await.unwrap();

  let specialties = s.dimensions(DimensionKind::Specialty).await.unwrap();
  assert_eq!(specialties.len(), 1);
  assert_eq!(s.dimensions(DimensionKind::SizeRange).await.unwrap().len(), 0);

  let industry_links = s.links(DimensionKind::Industry).await.unwrap();
  assert_eq!(industry_links.len(), 1);
  assert_eq!(industry_links[0].company_id, broken_id);

  let specialty_report = reports.iter().find(|r| r.stage == Stage::Specialty).unwrap();
  assert_eq!(specialty_report.records, 2);
  assert_eq!(specialty_report.sub_records, 1);
}

#[tokio::test]
async fn empty_detail_objects_get_placeholder_rows() {
  let s = store().await;
  let id = stage(&s, json!({"updates": [{}], "affiliated_companies": [{}]})).await;

  pipeline(&s).run_all().await.unwrap();

  let updates = s.details(DetailKind::Update).await.unwrap();
  assert_eq!(updates.len(), 1);
  assert_eq!(updates[0].company_id, id);
  let DetailValue::Update(u) = &updates[0].value else {
    panic!("expected update");
  };
  assert_eq!(u.article_link, NO_LINK);
  assert_eq!(u.update_text, "");
  assert_eq!(u.posted_on, unknown_date());

  let affiliated = s.details(DetailKind::AffiliatedCompany).await.unwrap();
  assert_eq!(affiliated.len(), 1);
  assert_eq!(
    affiliated[0].value,
    DetailValue::AffiliatedCompany(firmograph_core::entity::AffiliatedCompany {
      name:         NO_NAME.into(),
      linkedin_url: NO_LINK.into(),
      industry:     NO_INDUSTRY.into(),
      location:     NO_LOCATION.into(),
    })
  );
}

#[tokio::test]
async fn nameless_similar_company_is_not_minted() {
  let s = store().await;
  stage(
    &s,
    json!({"similar_companies": [
      {"name": "", "link": "https://x"},
      {"link": "https://y"},
      {"name": "Initrode"}
    ]}),
  )
  .await;

  let reports = pipeline(&s).run_all().await.unwrap();

  let similar = s.dimensions(DimensionKind::SimilarCompany).await.unwrap();
  assert_eq!(similar.len(), 1);
  let DimensionValue::SimilarCompany(sc) = &similar[0].value else {
    panic!("expected similar company");
  };
  assert_eq!(sc.name, "Initrode");
  assert_eq!(s.links(DimensionKind::SimilarCompany).await.unwrap().len(), 1);
  let report = reports.iter().find(|r| r.stage == Stage::SimilarCompany).unwrap();
  assert_eq!(report.dropped, 2);
}

#[tokio::test]
async fn sequential_run_matches_concurrent_run() {
  let doc = json!({
    "specialities": ["A", "B"],
    "locations": [{"country": "DE", "city": "Berlin"}],
    "similar_companies": [{"name": "X"}, {"name": "Y"}],
  });

  let concurrent = store().await;
  stage(&concurrent, doc.clone()).await;
  pipeline(&concurrent).run_all().await.unwrap();

  let sequential = store().await;
  stage(&sequential, doc).await;
  Pipeline::new(sequential.clone(), PipelineOptions { concurrent_stages: false })
    .run_all()
    .await
    .unwrap();

  assert_eq!(
    concurrent.table_counts().await.unwrap(),
    sequential.table_counts().await.unwrap()
  );
}

// ─── Finalization ────────────────────────────────────────────────────────────

#[tokio::test]
async fn barrier_requires_every_stage() {
  let s = store().await;
  stage(&s, json!({"name": "Partial", "industry": "Retail"})).await;
  let p = pipeline(&s);

  assert!(matches!(
    p.barrier().await.unwrap_err(),
    firmograph_core::Error::StagesIncomplete(_)
  ));

  p.run(&[Stage::Industry, Stage::Specialty]).await.unwrap();
  let missing = match p.barrier().await.unwrap_err() {
    firmograph_core::Error::StagesIncomplete(missing) => missing,
    other => panic!("expected StagesIncomplete, got {other:?}"),
  };
  assert!(!missing.contains(&Stage::Industry));
  assert!(missing.contains(&Stage::Update));

  let rest: Vec<Stage> = missing.clone();
  p.run(&rest).await.unwrap();
  assert!(p.barrier().await.is_ok());
  assert_eq!(s.completed_stages().await.unwrap().len(), Stage::all().len());
}

#[tokio::test]
async fn finalize_drops_payload_columns_once() {
  let s = store().await;
  let id = stage(
    &s,
    json!({
      "name": "Vandelay Industries",
      "website": "https://vandelay.example",
      "industry": "Import/Export",
      "exit_data": [{"x": 1}],
    }),
  )
  .await;
  let p = pipeline(&s);
  p.run_all().await.unwrap();

  let barrier = p.barrier().await.unwrap();
  let dropped = p.finalize(&barrier).await.unwrap();
  assert_eq!(dropped.len(), PayloadField::all().len());
  assert!(dropped.contains(&"customer_list".to_owned()));
  assert!(s.is_finalized().await.unwrap());

  // Base record keeps its scalars; derived tables are intact.
  let records = s.list_staging().await.unwrap();
  assert_eq!(records[0].company_id, id);
  assert_eq!(records[0].profile.name.as_deref(), Some("Vandelay Industries"));
  assert!(records[0].payloads.is_empty());
  assert_eq!(s.links(DimensionKind::Industry).await.unwrap().len(), 1);

  // One-way: nothing left to drop, and no further stages or staging.
  assert!(p.finalize(&barrier).await.unwrap().is_empty());
  assert!(matches!(
    p.run_all().await.unwrap_err(),
    firmograph_core::Error::AlreadyFinalized
  ));
  assert!(s.stage_record(NewStagingRecord::default()).await.is_err());
}

#[tokio::test]
async fn staging_after_a_run_reopens_the_barrier() {
  let s = store().await;
  stage(&s, json!({"name": "Early", "specialities": ["Early Specialty"]})).await;
  let p = pipeline(&s);
  p.run_all().await.unwrap();
  assert!(p.barrier().await.is_ok());

  let late = stage(&s, json!({"name": "Late", "specialities": ["Late Specialty"]})).await;

  assert!(s.completed_stages().await.unwrap().is_empty());
  let missing = match p.barrier().await.unwrap_err() {
    firmograph_core::Error::StagesIncomplete(missing) => missing,
    other => panic!("expected StagesIncomplete, got {other:?}"),
  };
  assert_eq!(missing, Stage::all());

  p.run_all().await.unwrap();
  let barrier = p.barrier().await.unwrap();
  p.finalize(&barrier).await.unwrap();

  let late_specialty = s
    .dimensions(DimensionKind::Specialty)
    .await
    .unwrap()
    .into_iter()
    .find(|d| d.value == DimensionValue::Specialty("Late Specialty".into()))
    .unwrap();
  let links = s.links(DimensionKind::Specialty).await.unwrap();
  assert!(
    links
      .iter()
      .any(|l| l.company_id == late && l.dimension_id == late_specialty.dimension_id)
  );
}

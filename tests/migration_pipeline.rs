mod common;

use common::{legacy_world, Banner, CountingPrompt, RecordingNotifier, PLACEHOLDER};
use serde_json::json;

use demonlord::errors::RulesError;
use demonlord::host::FixedPrompt;
use demonlord::migration::{
    Checkpoint, FailureKind, Host, MigrationOutcome, MigrationPipeline, MigrationReport,
};
use demonlord::storage::{
    BulkWrite, Document, PackInfo, Patch, Population, SledWorldStore, WorldStore,
};

fn completed(outcome: MigrationOutcome) -> MigrationReport {
    match outcome {
        MigrationOutcome::Completed(report) => report,
        other => panic!("expected a completed run, got {:?}", other),
    }
}

fn run_as_gm(
    pipeline: &MigrationPipeline,
    store: &dyn WorldStore,
    notifier: &RecordingNotifier,
) -> MigrationOutcome {
    let host = Host {
        store,
        session: &true,
        notifier,
        prompt: &FixedPrompt(true),
    };
    pipeline.run(&host).expect("pipeline run")
}

#[test]
fn non_gamemaster_session_changes_nothing() {
    let (_tmp, store) = legacy_world("1.0.0");
    let notifier = RecordingNotifier::default();
    let host = Host {
        store: &store,
        session: &false,
        notifier: &notifier,
        prompt: &FixedPrompt(true),
    };

    let outcome = MigrationPipeline::new("3.1.0").run(&host).unwrap();
    assert!(matches!(outcome, MigrationOutcome::NotPermitted));
    assert_eq!(store.schema_version().unwrap().as_deref(), Some("1.0.0"));
    assert_eq!(store.get_item("club").unwrap().system["strengthmin"], json!(10));
    assert!(notifier.banners.borrow().is_empty());
}

#[test]
fn new_world_is_stamped_without_running_steps() {
    let (_tmp, store) = common::empty_world();
    store
        .put_item(&Document::new("club", "Club", "weapon", json!({"strengthmin": 10})))
        .unwrap();
    let notifier = RecordingNotifier::default();

    let outcome = run_as_gm(&MigrationPipeline::new("3.1.0"), &store, &notifier);
    match outcome {
        MigrationOutcome::FirstRun { stamped } => assert_eq!(stamped, "3.1.0"),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(store.schema_version().unwrap().as_deref(), Some("3.1.0"));
    assert_eq!(store.get_item("club").unwrap().system, json!({"strengthmin": 10}));
    assert!(notifier.banners.borrow().is_empty());
}

#[test]
fn blank_stored_version_counts_as_new_world() {
    let (_tmp, store) = common::empty_world();
    store.set_schema_version("  ").unwrap();
    let outcome = run_as_gm(
        &MigrationPipeline::new("3.1.0"),
        &store,
        &RecordingNotifier::default(),
    );
    assert!(matches!(outcome, MigrationOutcome::FirstRun { .. }));
    assert_eq!(store.schema_version().unwrap().as_deref(), Some("3.1.0"));
}

#[test]
fn full_upgrade_from_one_dot_oh() {
    let (_tmp, store) = legacy_world("1.0.0");
    let notifier = RecordingNotifier::default();

    let report = completed(run_as_gm(&MigrationPipeline::new("3.1.0"), &store, &notifier));
    let steps: Vec<&str> = report.steps.iter().map(|s| s.step.as_str()).collect();
    assert_eq!(steps, vec!["1.7.7", "2.0.0", "3.1.0"]);
    assert!(!report.has_errors(), "failures: {:?}", report.failures().collect::<Vec<_>>());
    assert!(!report.compatibility_warning);
    assert_eq!(report.checkpoint, Checkpoint::Stamped);
    assert_eq!(store.schema_version().unwrap().as_deref(), Some("3.1.0"));

    // 2.0.0 icons
    let club = store.get_item("club").unwrap();
    assert_eq!(
        club.img.as_deref(),
        Some("systems/demonlord/assets/icons/weapons/club.webp")
    );
    let fireball = store.get_item("fireball").unwrap();
    assert_eq!(
        fireball.img.as_deref(),
        Some("systems/demonlord/assets/icons/spell/spell.webp")
    );

    // 3.1.0 requirement on world items; falsy strengthmin untouched
    assert_eq!(
        club.system,
        json!({"requirement": {"attribute": "Strength", "minvalue": 10}})
    );
    assert_eq!(store.get_item("rope").unwrap().system, json!({"strengthmin": 0}));

    // actors: backfill, reset, icons, corruption
    let hero = store.get_actor("hero").unwrap();
    assert_eq!(
        hero.img.as_deref(),
        Some("systems/demonlord/assets/icons/portraits/hero.webp")
    );
    assert_eq!(
        hero.system["religion"]["image"],
        json!("systems/demonlord/assets/icons/religion/sun.webp")
    );
    assert_eq!(hero.system["attributes"]["strength"]["value"], json!(10));
    assert_eq!(hero.system["characteristics"]["speed"], json!(10));
    assert_eq!(hero.system["afflictions"]["dazed"], json!(false));
    assert_eq!(
        hero.system["characteristics"]["corruption"],
        json!({"value": 3, "immune": false})
    );

    let axe = &hero.items[0];
    assert_eq!(axe.img.as_deref(), Some("systems/demonlord/assets/icons/weapon/weapon.webp"));
    assert_eq!(axe.system["requirement"]["minvalue"], json!(12));
    assert!(axe.system.get("strengthmin").is_none());

    let ghoul = store.get_actor("ghoul").unwrap();
    assert_eq!(
        ghoul.system["characteristics"]["corruption"],
        json!({"value": 1, "immune": false})
    );
    // backfilled by 1.7.7, never reset
    assert_eq!(ghoul.system["attributes"]["strength"]["value"], json!(10));
    assert_eq!(ghoul.system["afflictions"]["prone"], json!(false));

    // packs
    let halberd = store.get_pack_document("core-items", "halberd").unwrap();
    assert_eq!(halberd.system["requirement"]["minvalue"], json!(13));
    let maul = store.get_pack_document("sealed-items", "maul").unwrap();
    assert_eq!(maul.system, json!({"strengthmin": 15}));
    let troll = store.get_pack_document("bestiary", "troll").unwrap();
    assert_eq!(
        troll.system["characteristics"]["corruption"],
        json!({"value": 2, "immune": false})
    );
    assert_eq!(troll.items[0].system["requirement"]["minvalue"], json!(11));

    // one start + one success banner per step, all permanent
    let banners = notifier.banners.borrow();
    assert_eq!(banners.len(), 6);
    assert!(banners.iter().all(|(level, _, permanent)| *level == Banner::Info && *permanent));
    assert!(banners[0].1.starts_with("Applying Demonlord System Migration for version 3.1.0"));
    assert_eq!(banners[1].1, "Demonlord System Migration to version 3.1.0 completed!");
}

#[test]
fn second_run_is_a_no_op() {
    let (_tmp, store) = legacy_world("3.0.4");
    let pipeline = MigrationPipeline::new("3.1.0");
    let first = completed(run_as_gm(&pipeline, &store, &RecordingNotifier::default()));
    assert!(first.steps[0].records_patched > 0);

    let again = completed(run_as_gm(&pipeline, &store, &RecordingNotifier::default()));
    assert!(again.steps.is_empty());

    // Even when forced back, the transforms find nothing left to do.
    store.set_schema_version("3.0.4").unwrap();
    let forced = completed(run_as_gm(&pipeline, &store, &RecordingNotifier::default()));
    assert_eq!(forced.steps.len(), 1);
    assert_eq!(forced.steps[0].records_patched, 0);
    assert!(!forced.has_errors());
}

#[test]
fn recent_world_only_runs_latest_step() {
    let (_tmp, store) = legacy_world("2.5.1");
    let notifier = RecordingNotifier::default();
    let report = completed(run_as_gm(&MigrationPipeline::new("3.1.0"), &store, &notifier));

    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].step, "3.1.0");
    // icon step did not run
    assert_eq!(
        store.get_item("club").unwrap().img.as_deref(),
        Some("systems/demonlord/icons/weapons/club.png")
    );
    assert_eq!(notifier.count(Banner::Info), 2);
}

#[test]
fn modern_host_skips_legacy_steps_and_warning() {
    let (_tmp, store) = legacy_world("0.5");
    let notifier = RecordingNotifier::default();
    let pipeline = MigrationPipeline::new("3.1.0").with_host_generation(Some(10));

    let report = completed(run_as_gm(&pipeline, &store, &notifier));
    assert!(!report.compatibility_warning);
    assert_eq!(report.steps.len(), 1);
    assert_eq!(notifier.count(Banner::Error), 0);
    let hero = store.get_actor("hero").unwrap();
    assert_eq!(hero.system["attributes"]["strength"]["value"], json!(14));
    assert_eq!(hero.system["characteristics"]["corruption"]["value"], json!(3));
}

#[test]
fn ancient_world_gets_compatibility_warning_and_still_migrates() {
    let (_tmp, store) = legacy_world("0.7.2");
    let notifier = RecordingNotifier::default();

    let report = completed(run_as_gm(&MigrationPipeline::new("3.1.0"), &store, &notifier));
    assert!(report.compatibility_warning);
    assert_eq!(report.steps.len(), 3);

    let banners = notifier.banners.borrow();
    assert_eq!(banners[0].0, Banner::Error);
    assert!(banners[0].2);
    assert!(banners[0].1.contains("cannot be reliably migrated"));
    assert_eq!(store.schema_version().unwrap().as_deref(), Some("3.1.0"));
}

#[test]
fn minimum_compatible_version_is_configurable() {
    let (_tmp, store) = legacy_world("1.0.0");
    let pipeline = MigrationPipeline::new("3.1.0").with_minimum_compatible_version("1.5");
    let report = completed(run_as_gm(&pipeline, &store, &RecordingNotifier::default()));
    assert!(report.compatibility_warning);
}

#[test]
fn unparsable_stored_version_aborts_before_any_write() {
    let (_tmp, store) = legacy_world("not-a-version");
    let host = Host {
        store: &store,
        session: &true,
        notifier: &RecordingNotifier::default(),
        prompt: &FixedPrompt(true),
    };
    let err = MigrationPipeline::new("3.1.0").run(&host).unwrap_err();
    assert!(matches!(err, RulesError::InvalidVersion(_)));
    assert_eq!(store.schema_version().unwrap().as_deref(), Some("not-a-version"));
    assert_eq!(store.get_item("club").unwrap().system["strengthmin"], json!(10));
}

#[test]
fn dry_run_reports_patches_without_writing() {
    let (_tmp, store) = legacy_world("3.0.0");
    let pipeline = MigrationPipeline::new("3.1.0").with_dry_run(true);
    let report = completed(run_as_gm(&pipeline, &store, &RecordingNotifier::default()));

    assert!(report.dry_run);
    assert_eq!(report.checkpoint, Checkpoint::Skipped);
    // club, axe, hero, ghoul, halberd, troll, claws
    assert_eq!(report.steps[0].records_patched, 7);
    assert_eq!(store.schema_version().unwrap().as_deref(), Some("3.0.0"));
    assert_eq!(store.get_item("club").unwrap().system, json!({"strengthmin": 10}));
    assert_eq!(
        store.get_actor("hero").unwrap().system["characteristics"]["corruption"],
        json!(3)
    );
}

#[test]
fn dry_run_on_new_world_does_not_stamp() {
    let (_tmp, store) = common::empty_world();
    let pipeline = MigrationPipeline::new("3.1.0").with_dry_run(true);
    let outcome = run_as_gm(&pipeline, &store, &RecordingNotifier::default());
    assert!(matches!(outcome, MigrationOutcome::FirstRun { .. }));
    assert_eq!(store.schema_version().unwrap(), None);
}

#[test]
fn rejected_record_does_not_stop_its_population() {
    let (_tmp, store) = legacy_world("3.0.0");
    // a scalar requirement cannot take the new sub-keys
    store
        .put_item(&Document::new(
            "flail",
            "Flail",
            "weapon",
            json!({"strengthmin": 11, "requirement": "Strength 11"}),
        ))
        .unwrap();
    let notifier = RecordingNotifier::default();

    let report = completed(run_as_gm(&MigrationPipeline::new("3.1.0"), &store, &notifier));
    assert!(report.has_errors());
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    let (step, failure) = failures[0];
    assert_eq!(step, "3.1.0");
    assert_eq!(failure.record_id.as_deref(), Some("flail"));
    assert_eq!(failure.kind, FailureKind::Write);
    assert_eq!(failure.population, "world items");

    // neighbours in the same bulk write and later populations still landed
    assert!(store.get_item("club").unwrap().system.get("requirement").is_some());
    assert_eq!(store.get_item("flail").unwrap().system["strengthmin"], json!(11));
    assert!(store.get_actor("ghoul").unwrap().system["characteristics"]["corruption"].is_object());

    assert_eq!(notifier.count(Banner::Error), 1);
    assert_eq!(
        notifier.messages().last().map(String::as_str),
        Some("Demonlord System Migration to version 3.1.0 error")
    );
    assert_eq!(report.checkpoint, Checkpoint::Stamped);
    assert_eq!(store.schema_version().unwrap().as_deref(), Some("3.1.0"));
}

/// Store that fails reads or bulk writes of chosen populations.
struct FaultyStore<'a> {
    inner: &'a SledWorldStore,
    unreadable: Option<Population>,
    unwritable: Option<Population>,
}

impl<'a> FaultyStore<'a> {
    fn new(inner: &'a SledWorldStore) -> Self {
        Self {
            inner,
            unreadable: None,
            unwritable: None,
        }
    }
}

impl WorldStore for FaultyStore<'_> {
    fn packs(&self) -> Result<Vec<PackInfo>, RulesError> {
        self.inner.packs()
    }

    fn documents(&self, population: &Population) -> Result<Vec<Document>, RulesError> {
        if self.unreadable.as_ref() == Some(population) {
            return Err(RulesError::Internal(format!("{} unavailable", population)));
        }
        self.inner.documents(population)
    }

    fn bulk_update(
        &self,
        population: &Population,
        patches: &[Patch],
    ) -> Result<BulkWrite, RulesError> {
        if self.unwritable.as_ref() == Some(population) {
            return Err(RulesError::Internal(format!("{} is read-only", population)));
        }
        self.inner.bulk_update(population, patches)
    }

    fn schema_version(&self) -> Result<Option<String>, RulesError> {
        self.inner.schema_version()
    }

    fn set_schema_version(&self, version: &str) -> Result<(), RulesError> {
        self.inner.set_schema_version(version)
    }
}

#[test]
fn unreadable_population_is_isolated() {
    let (_tmp, store) = legacy_world("3.0.0");
    let flaky = FaultyStore {
        unreadable: Some(Population::WorldActors),
        ..FaultyStore::new(&store)
    };

    let report = completed(run_as_gm(
        &MigrationPipeline::new("3.1.0"),
        &flaky,
        &RecordingNotifier::default(),
    ));
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].1.kind, FailureKind::Read);
    assert_eq!(failures[0].1.record_id, None);

    // items before and packs after the failed read were migrated
    assert!(store.get_item("club").unwrap().system.get("requirement").is_some());
    assert!(store
        .get_pack_document("core-items", "halberd")
        .unwrap()
        .system
        .get("requirement")
        .is_some());
    // embedded items are reached through actors, so they wait for the next run
    assert_eq!(store.get_actor("hero").unwrap().items[0].system["strengthmin"], json!(12));
    assert_eq!(store.schema_version().unwrap().as_deref(), Some("3.1.0"));
}

#[test]
fn failed_bulk_write_is_isolated() {
    let (_tmp, store) = legacy_world("3.0.0");
    let flaky = FaultyStore {
        unwritable: Some(Population::WorldItems),
        ..FaultyStore::new(&store)
    };
    let notifier = RecordingNotifier::default();

    let report = completed(run_as_gm(&MigrationPipeline::new("3.1.0"), &flaky, &notifier));
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    let (step, failure) = failures[0];
    assert_eq!(step, "3.1.0");
    assert_eq!(failure.kind, FailureKind::Write);
    assert_eq!(failure.record_id, None);
    assert_eq!(failure.population, "world items");

    // the whole world item write was lost
    assert_eq!(store.get_item("club").unwrap().system, json!({"strengthmin": 10}));
    // later populations still landed
    let hero = store.get_actor("hero").unwrap();
    assert_eq!(
        hero.system["characteristics"]["corruption"],
        json!({"value": 3, "immune": false})
    );
    assert!(hero.items[0].system.get("requirement").is_some());
    assert!(store
        .get_pack_document("core-items", "halberd")
        .unwrap()
        .system
        .get("requirement")
        .is_some());
    assert!(store.get_pack_document("bestiary", "troll").unwrap().system["characteristics"]
        ["corruption"]
        .is_object());

    assert_eq!(notifier.count(Banner::Error), 1);
    assert_eq!(report.checkpoint, Checkpoint::Stamped);
    assert_eq!(store.schema_version().unwrap().as_deref(), Some("3.1.0"));
}

#[test]
fn unconvertible_record_is_reported_and_skipped() {
    let (_tmp, store) = legacy_world("3.0.0");
    store
        .put_item(&Document::new(
            "flail",
            "Flail",
            "weapon",
            json!({"strengthmin": {"value": 10}}),
        ))
        .unwrap();

    let report = completed(run_as_gm(
        &MigrationPipeline::new("3.1.0"),
        &store,
        &RecordingNotifier::default(),
    ));
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    let failure = failures[0].1;
    assert_eq!(failure.kind, FailureKind::Predicate);
    assert_eq!(failure.record_id.as_deref(), Some("flail"));
    assert_eq!(failure.population, "world items");

    assert_eq!(
        store.get_item("flail").unwrap().system,
        json!({"strengthmin": {"value": 10}})
    );
    assert!(store.get_item("club").unwrap().system.get("requirement").is_some());
    assert!(store.get_actor("ghoul").unwrap().system["characteristics"]["corruption"].is_object());
    assert_eq!(store.schema_version().unwrap().as_deref(), Some("3.1.0"));
}

#[test]
fn stored_version_with_build_metadata_migrates() {
    let (_tmp, store) = legacy_world("3.0.0+build.5");
    let report = completed(run_as_gm(
        &MigrationPipeline::new("3.1.0"),
        &store,
        &RecordingNotifier::default(),
    ));
    assert_eq!(report.steps.len(), 1);
    assert!(!report.has_errors());
    assert!(store.get_item("club").unwrap().system.get("requirement").is_some());
    assert_eq!(store.schema_version().unwrap().as_deref(), Some("3.1.0"));

    // a build of the current release is already up to date
    store.set_schema_version("3.1.0+build.9").unwrap();
    let again = completed(run_as_gm(
        &MigrationPipeline::new("3.1.0"),
        &store,
        &RecordingNotifier::default(),
    ));
    assert!(again.steps.is_empty());
}

#[test]
fn icon_question_is_asked_once_and_respected() {
    let (_tmp, store) = legacy_world("1.9.0");
    let prompt = CountingPrompt::new(false);
    let host = Host {
        store: &store,
        session: &true,
        notifier: &RecordingNotifier::default(),
        prompt: &prompt,
    };

    completed(MigrationPipeline::new("3.1.0").run(&host).unwrap());
    assert_eq!(prompt.asked.get(), 1);
    // declined: placeholders stay, legacy paths still move
    assert_eq!(store.get_item("fireball").unwrap().img.as_deref(), Some(PLACEHOLDER));
    assert_eq!(store.get_actor("hero").unwrap().items[0].img.as_deref(), Some(PLACEHOLDER));
    assert_eq!(
        store.get_item("club").unwrap().img.as_deref(),
        Some("systems/demonlord/assets/icons/weapons/club.webp")
    );
}

#[test]
fn preanswered_icon_question_skips_prompt() {
    let (_tmp, store) = legacy_world("1.9.0");
    let prompt = CountingPrompt::new(false);
    let host = Host {
        store: &store,
        session: &true,
        notifier: &RecordingNotifier::default(),
        prompt: &prompt,
    };

    let pipeline = MigrationPipeline::new("3.1.0").with_default_icons(Some(true));
    completed(pipeline.run(&host).unwrap());
    assert_eq!(prompt.asked.get(), 0);
    assert_ne!(store.get_item("fireball").unwrap().img.as_deref(), Some(PLACEHOLDER));
}

use std::sync::Arc;

use modelgraph_core::{AreDistinct, ModelGraphError};
use modelgraph_model::*;
use parking_lot::Mutex;

struct Playlist;

impl ModelType for Playlist {
    const NAME: &'static str = "Playlist";

    fn describe(builder: &mut TypeBuilder<Self>) -> Result<()> {
        builder
            .collection::<String>("tracks")?
            .enable_recording()
            .check(|_, items| items.len() > 3, ValidationKind::Error, "at most 3 tracks")
            .on_changed(|model, items| {
                let _ = model.set("track_count", items.len());
            });

        builder.collection::<String>("limited")?.check_with(
            |_, items| items.len() > 2,
            ValidationKind::Error,
            "at most 2 entries",
            ValidationOptions::default().stop_on_error(),
        );

        builder
            .collection::<u32>("ratings")?
            .validate_using(AreDistinct, ValidationKind::Error, None);

        builder.property::<String>("title")?.enable_recording();
        builder.depend_on("summary", &["tracks"]);
        Ok(())
    }
}

fn playlist() -> Arc<Model<Playlist>> {
    Model::<Playlist>::new(&DescriptorRegistry::new()).unwrap()
}

fn log_changes(model: &Model<Playlist>) -> (Arc<Mutex<Vec<String>>>, Subscription) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let sub = model.on_property_changed(move |e| {
        if e.property != "track_count" {
            sink.lock().push(e.property.clone());
        }
    });
    (log, sub)
}

fn tracks(model: &Model<Playlist>) -> Vec<String> {
    model.collection_items::<String>("tracks").unwrap()
}

#[test]
fn unscoped_change_notifies_and_runs_callbacks() {
    let model = playlist();
    let (log, _sub) = log_changes(&model);

    model.collection::<String>("tracks").unwrap().push("intro".to_string()).unwrap();

    assert_eq!(*log.lock(), vec!["tracks", "summary"]);
    assert_eq!(model.get::<usize>("track_count").unwrap(), 1);
    assert_eq!(tracks(&model), vec!["intro"]);
}

#[test]
fn undo_of_scoped_additions_restores_items() {
    let model = playlist();
    model.collection::<String>("tracks").unwrap().push("keep".to_string()).unwrap();

    model
        .run_scope(|m, _| {
            let tracks = m.collection::<String>("tracks")?;
            tracks.push("a".to_string())?;
            tracks.push("b".to_string())?;
            tracks.insert(0, "c".to_string())?;
            Ok(())
        })
        .unwrap();
    assert_eq!(tracks(&model), vec!["c", "keep", "a", "b"]);

    model.undo().unwrap();
    assert_eq!(tracks(&model), vec!["keep"]);
    assert_eq!(model.get::<usize>("track_count").unwrap(), 1);

    model.redo().unwrap();
    assert_eq!(tracks(&model), vec!["c", "keep", "a", "b"]);
}

#[test]
fn size_rule_flags_errors_but_keeps_item() {
    let model = playlist();
    let tracks_handle = model.collection::<String>("tracks").unwrap();
    for name in ["one", "two", "three"] {
        tracks_handle.push(name.to_string()).unwrap();
    }
    assert!(!model.has_errors());

    tracks_handle.push("four".to_string()).unwrap();
    assert_eq!(tracks_handle.len(), 4);
    assert!(model.has_errors());
    assert_eq!(model.get_errors(Some("tracks"))[0].message, "at most 3 tracks");

    tracks_handle.remove(&"four".to_string()).unwrap();
    assert!(!model.has_errors());
}

#[test]
fn stop_rule_keeps_item_without_notifying() {
    let model = playlist();
    let (log, _sub) = log_changes(&model);
    let limited = model.collection::<String>("limited").unwrap();

    limited.extend(vec!["a".to_string(), "b".to_string()]).unwrap();
    limited.push("c".to_string()).unwrap();

    assert_eq!(limited.items(), vec!["a", "b", "c"]);
    assert!(model.has_errors());
    assert_eq!(*log.lock(), vec!["limited"]);
}

#[test]
fn structural_edits_undo_in_reverse() {
    let model = playlist();
    {
        let tracks = model.collection::<String>("tracks").unwrap();
        tracks
            .extend(vec!["a".to_string(), "b".to_string(), "c".to_string()])
            .unwrap();
    }

    model
        .run_scope(|m, _| {
            let tracks = m.collection::<String>("tracks")?;
            tracks.replace(0, "A".to_string())?;
            tracks.move_item(2, 0)?;
            tracks.remove(&"b".to_string())?;
            tracks.remove_at(0)?;
            Ok(())
        })
        .unwrap();
    assert_eq!(tracks(&model), vec!["A"]);

    model.undo().unwrap();
    assert_eq!(tracks(&model), vec!["a", "b", "c"]);

    model.redo().unwrap();
    assert_eq!(tracks(&model), vec!["A"]);
}

#[test]
fn clear_is_undoable() {
    let model = playlist();
    model
        .collection::<String>("tracks")
        .unwrap()
        .extend(vec!["x".to_string(), "y".to_string()])
        .unwrap();

    let scope = model
        .run_scope(|m, _| {
            m.collection::<String>("tracks")?.clear()?;
            Ok(())
        })
        .unwrap();
    assert!(tracks(&model).is_empty());
    assert_eq!(scope.records_len(), 1);

    scope.undo().unwrap();
    assert_eq!(tracks(&model), vec!["x", "y"]);
}

#[test]
fn scoped_collection_changes_notify_once() {
    let model = playlist();
    let (log, _sub) = log_changes(&model);

    model
        .run_scope(|m, _| {
            let tracks = m.collection::<String>("tracks")?;
            tracks.push("a".to_string())?;
            tracks.push("b".to_string())?;
            Ok(())
        })
        .unwrap();

    assert_eq!(*log.lock(), vec!["tracks", "summary"]);
}

#[test]
fn distinct_validator_on_collection() {
    let model = playlist();
    let ratings = model.collection::<u32>("ratings").unwrap();
    ratings.push(5).unwrap();
    ratings.push(5).unwrap();

    assert!(model.has_errors());
    assert_eq!(
        model.validation_results("ratings")[0].message,
        "Repeated items found"
    );
}

#[test]
fn invalid_index_is_an_error() {
    let model = playlist();
    let tracks = model.collection::<String>("tracks").unwrap();

    assert!(matches!(
        tracks.remove_at(3),
        Err(ModelError::Core(ModelGraphError::Collection(_)))
    ));
    assert!(!tracks.remove(&"missing".to_string()).unwrap());
    assert!(tracks.is_empty());
}

#[test]
fn undo_and_redo_survive_unrecorded_edits() {
    let model = playlist();
    model
        .run_scope(|m, _| {
            m.collection::<String>("tracks")?.push("a".to_string())?;
            m.set("title", "Mix".to_string())?;
            Ok(())
        })
        .unwrap();
    model
        .collection::<String>("tracks")
        .unwrap()
        .insert(0, "z".to_string())
        .unwrap();

    model.undo().unwrap();
    assert_eq!(tracks(&model), vec!["z"]);
    assert_eq!(model.get::<String>("title").unwrap(), "");
    assert_eq!(model.journal_position(), None);
    assert!(!model.can_undo());
    assert!(model.can_redo());

    model.redo().unwrap();
    assert_eq!(tracks(&model), vec!["a", "z"]);
    assert_eq!(model.get::<String>("title").unwrap(), "Mix");
    assert_eq!(model.journal_position(), Some(0));

    // Items removed outside the scope are skipped when it is undone again.
    model
        .collection::<String>("tracks")
        .unwrap()
        .remove(&"a".to_string())
        .unwrap();
    model.undo().unwrap();
    assert_eq!(tracks(&model), vec!["z"]);
    assert_eq!(model.get::<usize>("track_count").unwrap(), 1);
}

//! End-to-end flows through [`Scene::handle_event`].

use futures::FutureExt;

use super::*;
use crate::convert::{BusinessPoint, BusinessRect, IgnoreArea};
use crate::geometry::{Point, Rect};
use crate::input::{HitTarget, Key, KeyEvent, MouseButton, PointerEvent};
use crate::keybindings::Chord;
use crate::shape::ShapeStatus;

fn scene() -> Scene {
    let mut scene = Scene::default();
    scene.register_type_list(&["car", "person"]);
    scene
}

fn drag(scene: &mut Scene, from: (f32, f32), to: (f32, f32)) {
    scene.handle_event(&InputEvent::PointerDown(PointerEvent::at(from.0, from.1)));
    scene.handle_event(&InputEvent::PointerMove(PointerEvent::at(to.0, to.1)));
    scene.handle_event(&InputEvent::PointerUp(PointerEvent::at(to.0, to.1)));
}

fn click(scene: &mut Scene, x: f32, y: f32) {
    scene.handle_event(&InputEvent::PointerMove(PointerEvent::at(x, y)));
    scene.handle_event(&InputEvent::PointerDown(PointerEvent::at(x, y)));
    scene.handle_event(&InputEvent::PointerUp(PointerEvent::at(x, y)));
}

fn corners(record: &BusinessRecord) -> Vec<(f32, f32)> {
    match record {
        BusinessRecord::Rect(rect) => rect.coordinates.iter().map(|c| (c.axis_x, c.axis_y)).collect(),
        BusinessRecord::IgnoreArea(_) => panic!("expected a rect record"),
    }
}

fn grouped_record(name: &str, group: &str, x: f32, y: f32) -> BusinessRecord {
    BusinessRecord::Rect(BusinessRect {
        name: name.to_string(),
        source: 0,
        coordinates: vec![BusinessPoint::new(x, y), BusinessPoint::new(x + 10.0, y + 10.0)],
        group_id: Some(group.to_string()),
    })
}

#[test]
fn test_draw_rect_produces_business_records() {
    let mut scene = scene();
    let result = scene.draw_rect("car", None);
    assert!(scene.stage().is_drawing());

    drag(&mut scene, (10.0, 10.0), (50.0, 40.0));

    let shape = result.now_or_never().unwrap().unwrap();
    assert!(scene.find_shape(&shape.id()).is_some());
    assert!(!scene.stage().is_drawing());
    assert!(!scene.has_current_action());
    assert_eq!(scene.stage().shape_count(LayerKind::Staging), 0);

    let records = scene.model_to_business();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].name(), "car");
    assert_eq!(
        corners(&records[0]),
        vec![(10.0, 10.0), (50.0, 10.0), (50.0, 40.0), (10.0, 40.0)]
    );
    assert_eq!(records[1], BusinessRecord::IgnoreArea(IgnoreArea::new(Vec::new())));

    let color = scene.committed_rects()[0].borrow().color();
    assert_eq!(Some(color), scene.type_table().and_then(|t| t.color_of("car")));
}

#[test]
fn test_committed_rect_reacts_to_clicks() {
    let mut scene = scene();
    let _result = scene.draw_rect("person", None);
    drag(&mut scene, (10.0, 10.0), (50.0, 40.0));
    let rect = scene.committed_rects()[0].clone();

    scene.handle_event(&InputEvent::Click(PointerEvent::at(20.0, 20.0).on(HitTarget::body(rect.id()))));
    assert_eq!(rect.borrow().status(), ShapeStatus::Active);
    scene.handle_event(&InputEvent::Click(PointerEvent::at(500.0, 500.0)));
    assert_eq!(rect.borrow().status(), ShapeStatus::Normal);
}

#[test]
fn test_rejected_draw_commits_nothing() {
    let mut scene = scene();
    let result = scene.draw_rect("car", None);
    scene.handle_event(&InputEvent::PointerDown(
        PointerEvent::at(10.0, 10.0).with_button(MouseButton::Right),
    ));

    assert_eq!(
        result.now_or_never().and_then(Result::err),
        Some(ActionError::InvalidInput("invalid button".to_string()))
    );
    assert!(scene.committed_rects().is_empty());
    assert!(!scene.stage().is_drawing());
}

#[test]
fn test_polygon_closed_by_key_keeps_committed_vertices() {
    let mut scene = scene();
    let result = scene.draw_polygon();

    click(&mut scene, 10.0, 10.0);
    click(&mut scene, 60.0, 10.0);
    click(&mut scene, 60.0, 60.0);
    scene.handle_event(&InputEvent::PointerMove(PointerEvent::at(30.0, 50.0)));
    scene.handle_event(&InputEvent::KeyUp(KeyEvent::plain(Key::Space)));

    let shape = result.now_or_never().unwrap().unwrap();
    let polygon = shape.as_polygon().unwrap();
    assert!(polygon.borrow().is_closed());
    assert_eq!(
        polygon.borrow().points(),
        &[Point::new(10.0, 10.0), Point::new(60.0, 10.0), Point::new(60.0, 60.0)]
    );

    let records = scene.model_to_business();
    let BusinessRecord::IgnoreArea(area) = &records[0] else {
        panic!("expected only the ignore area");
    };
    assert_eq!(area.ignore_area_coordinates.len(), 1);
    assert_eq!(area.ignore_area_coordinates[0].coordinates.len(), 3);
}

#[test]
fn test_new_action_replaces_current() {
    let mut scene = scene();
    let baseline = scene.stage().dispatcher().listener_count();

    let first = scene.draw_rect("car", None);
    assert!(scene.stage().dispatcher().listener_count() > baseline);
    let second = scene.draw_polygon();

    assert_eq!(
        first.now_or_never().and_then(Result::err),
        Some(ActionError::Cancelled {
            reason: REASON_CHANGED.to_string()
        })
    );
    assert!(scene.has_current_action());
    assert!(scene.stage().is_drawing());

    scene.dispose_current_action();
    assert_eq!(
        second.now_or_never().and_then(Result::err),
        Some(ActionError::Cancelled {
            reason: REASON_DISPOSED.to_string()
        })
    );
    assert!(!scene.has_current_action());
    assert!(!scene.stage().is_drawing());
    assert_eq!(scene.stage().dispatcher().listener_count(), baseline);
    assert_eq!(scene.stage().shape_count(LayerKind::Staging), 0);
}

#[test]
fn test_chain_cancels_only_the_shape_in_flight() {
    let mut scene = scene();
    let chain = scene.draw_rect_chain("car", Some("g1"));
    assert!(chain.has_current());

    drag(&mut scene, (10.0, 10.0), (50.0, 40.0));
    assert_eq!(chain.committed_ids().len(), 1);

    scene.handle_event(&InputEvent::PointerDown(PointerEvent::at(100.0, 100.0)));
    scene.handle_event(&InputEvent::PointerMove(PointerEvent::at(150.0, 150.0)));
    assert_eq!(scene.stage().shape_count(LayerKind::Staging), 1);

    scene.dispose_current_action();
    assert_eq!(scene.stage().shape_count(LayerKind::Staging), 0);
    assert!(scene.has_current_action());
    assert!(chain.has_current());

    drag(&mut scene, (200.0, 200.0), (260.0, 230.0));
    assert_eq!(chain.committed_ids().len(), 2);
    for rect in scene.committed_rects() {
        assert_eq!(rect.borrow().group_id(), Some("g1"));
        assert_eq!(rect.borrow().text(), Some("g1"));
    }

    let _polygon = scene.draw_polygon();
    assert!(chain.is_stopped());
    assert!(scene.stage().is_drawing());
    assert_eq!(scene.committed_rects().len(), 2);
}

#[test]
fn test_range_restores_moved_shape() {
    let mut scene = scene();
    scene.register_range();
    scene.register_range();
    let mut events = scene.subscribe();
    let _result = scene.draw_rect("car", None);
    drag(&mut scene, (10.0, 10.0), (50.0, 40.0));
    let rect = scene.committed_rects()[0].clone();

    assert!(scene.start_edit(&rect.id()));
    scene.handle_event(&InputEvent::PointerDown(PointerEvent::at(20.0, 20.0).on(HitTarget::body(rect.id()))));
    scene.handle_event(&InputEvent::PointerMove(PointerEvent::at(1990.0, 20.0)));
    assert!(rect.borrow().rect().x > 1900.0);
    scene.handle_event(&InputEvent::PointerUp(PointerEvent::at(1990.0, 20.0)));

    assert_eq!(rect.borrow().rect(), Rect::new(10.0, 10.0, 40.0, 30.0));
    assert_eq!(scene.committed_rects().len(), 1);
    assert!(events.try_next().is_err());
    assert!(scene.end_edit(&rect.id()));
}

#[test]
fn test_range_evicts_shape_drawn_outside() {
    let mut scene = scene();
    scene.set_image_bounds(ImageBounds::new(100.0, 100.0));
    scene.register_range();
    let mut events = scene.subscribe();

    let result = scene.draw_rect("car", None);
    drag(&mut scene, (80.0, 80.0), (150.0, 150.0));
    let shape = result.now_or_never().unwrap().unwrap();

    assert!(scene.committed_rects().is_empty());
    assert_eq!(
        events.try_next().ok().flatten(),
        Some(SceneEvent::OutRange { id: shape.id() })
    );
    assert!(events.try_next().is_err());

    scene.unregister_range();
    let _result = scene.draw_rect("car", None);
    drag(&mut scene, (80.0, 80.0), (150.0, 150.0));
    assert_eq!(scene.committed_rects().len(), 1);
}

#[test]
fn test_business_round_trip_through_json() {
    let mut scene = scene();
    let json = r#"[
        {"name": "person", "source": 0, "groupId": "g1", "coordinates": [
            {"axisX": 5, "axisY": 6, "source": 0}, {"axisX": 12, "axisY": 6, "source": 0},
            {"axisX": 12, "axisY": 14, "source": 0}, {"axisX": 5, "axisY": 14, "source": 0}
        ]},
        {"name": "ignoreArea", "ignoreAreaCoordinates": [{"coordinates": [
            {"axisX": 1, "axisY": 1, "source": 0}, {"axisX": 9, "axisY": 1, "source": 0},
            {"axisX": 5, "axisY": 7, "source": 0}
        ]}]}
    ]"#;
    assert_eq!(scene.load_business_json(json).unwrap(), 2);
    assert_eq!(scene.committed_polygons().len(), 1);

    let records = records_from_json(&scene.business_json().unwrap()).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(corners(&records[0]), vec![(5.0, 6.0), (12.0, 6.0), (12.0, 14.0), (5.0, 14.0)]);
    let BusinessRecord::Rect(rect) = &records[0] else {
        panic!("expected a rect record first");
    };
    assert_eq!(rect.group_id.as_deref(), Some("g1"));
    assert!(records[1].is_ignore_area());
}

#[test]
fn test_conversion_without_type_table() {
    let scene = Scene::default();
    assert!(matches!(
        scene.try_model_to_business(),
        Err(ConversionError::MissingTypeTable)
    ));
    assert!(scene.model_to_business().is_empty());
    assert!(scene.business_to_model(&[grouped_record("car", "g", 0.0, 0.0)]).is_empty());
}

#[test]
fn test_group_operations() {
    let mut scene = scene();
    let records = vec![
        grouped_record("car", "g1", 0.0, 0.0),
        grouped_record("person", "g2", 20.0, 20.0),
        grouped_record("car", "g1", 40.0, 40.0),
    ];
    scene.load_business(&records).unwrap();

    let ids: Vec<String> = scene.group_list().into_iter().map(|g| g.id).collect();
    assert_eq!(ids, vec!["g1".to_string(), "g2".to_string()]);

    assert_eq!(scene.select_group("g1"), 2);
    let statuses: Vec<GroupStatus> = scene
        .committed_rects()
        .iter()
        .map(|r| r.borrow().group_status())
        .collect();
    assert_eq!(
        statuses,
        vec![GroupStatus::Selected, GroupStatus::Unselected, GroupStatus::Selected]
    );

    assert_eq!(scene.move_group("g1", 5.0, -1.0), 2);
    assert_eq!(scene.committed_rects()[2].borrow().rect(), Rect::new(45.0, 39.0, 10.0, 10.0));

    assert_eq!(scene.delete_group("g1").len(), 2);
    assert_eq!(scene.committed_rects().len(), 1);
}

#[test]
fn test_group_key_and_shortcuts() {
    let mut scene = scene();
    let mut events = scene.subscribe();
    scene.shortcuts_mut().register(Key::Char('d'), Chord::Plain, "delete");

    scene.handle_event(&InputEvent::KeyDown(KeyEvent::plain(Key::Char('g'))));
    assert!(scene.is_group_mode());
    scene.handle_event(&InputEvent::PointerUp(
        PointerEvent::at(0.0, 0.0).with_button(MouseButton::Right),
    ));
    scene.handle_event(&InputEvent::KeyUp(KeyEvent::plain(Key::Char('g'))));
    assert!(!scene.is_group_mode());
    scene.handle_event(&InputEvent::KeyUp(KeyEvent::plain(Key::Char('d'))));

    assert_eq!(events.try_next().ok().flatten(), Some(SceneEvent::DeleteCurrentGroup));
    assert_eq!(
        events.try_next().ok().flatten(),
        Some(SceneEvent::Shortcut {
            name: "delete".to_string()
        })
    );
}

#[test]
fn test_plugins_install_and_uninstall() {
    let mut scene = scene();
    assert_eq!(scene.plugin_names(), vec!["DeepSelectPlugin"]);
    assert!(scene.uninstall_plugin("DeepSelectPlugin"));
    let baseline = scene.stage().dispatcher().listener_count();
    scene.install_default_plugins();
    scene.install_plugin(Box::new(StageScalePlugin::new()));
    assert_eq!(
        scene.plugin_names(),
        vec!["StageDragPlugin", "DeepSelectPlugin", "StageScalePlugin"]
    );

    scene.handle_event(&InputEvent::Wheel {
        delta: 1.0,
        position: Point::new(0.0, 0.0),
    });
    assert!(scene.stage().view().scale < 1.0);

    for name in ["StageDragPlugin", "DeepSelectPlugin", "StageScalePlugin"] {
        assert!(scene.uninstall_plugin(name));
    }
    assert!(!scene.uninstall_plugin("StageScalePlugin"));
    assert_eq!(scene.stage().dispatcher().listener_count(), baseline);
}

#[test]
fn test_new_scene_validates_range_and_deep_selects() {
    let mut scene = scene();
    assert!(scene.is_range_registered());
    let records = vec![grouped_record("car", "g2", 2.0, 2.0), grouped_record("car", "g1", 0.0, 0.0)];
    scene.load_business(&records).unwrap();
    let outer = scene.committed_rects()[1].clone();
    outer.borrow_mut().set_rect(Rect::new(0.0, 0.0, 40.0, 40.0));

    scene.handle_event(&InputEvent::KeyDown(KeyEvent::plain(Key::Control)));
    scene.handle_event(&InputEvent::PointerMove(PointerEvent::at(5.0, 5.0)));
    scene.handle_event(&InputEvent::Click(PointerEvent::at(5.0, 5.0)));
    scene.handle_event(&InputEvent::KeyUp(KeyEvent::plain(Key::Control)));

    let top = scene.committed_rects().last().cloned().unwrap();
    assert_eq!(top.borrow().group_id(), Some("g2"));
    assert_eq!(top.borrow().status(), ShapeStatus::Active);

    let mut events = scene.subscribe();
    scene.handle_event(&InputEvent::PointerDown(PointerEvent::at(500.0, 500.0)));
    outer.borrow_mut().translate(5000.0, 0.0);
    scene.handle_event(&InputEvent::PointerUp(PointerEvent::at(500.0, 500.0)));
    assert_eq!(outer.borrow().rect(), Rect::new(0.0, 0.0, 40.0, 40.0));
    assert!(events.try_next().is_err());
}

#[test]
fn test_crosshair_follows_pointer() {
    let mut scene = scene();
    scene.enable_crosshair(true);
    scene.handle_event(&InputEvent::PointerMove(PointerEvent::at(30.0, 40.0)));
    let lines = scene.crosshair_lines().unwrap();
    assert_eq!(lines.vertical.from, Point::new(30.0, 0.0));
    assert_eq!(lines.horizontal.to, Point::new(1920.0, 40.0));
}

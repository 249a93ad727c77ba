mod common;

use nix::errno::Errno;
use std::sync::{Arc, Mutex};
use wsclient::protocol::*;
use wsclient::window::LayoutHints;
use wsclient::ClientError;

#[test]
fn test_create_and_destroy_restores_pools() {
    let (client, server, _shm) = common::connect();
    let before = client.pools().available();

    let ids: Vec<WinId> = (0..5)
        .map(|i| {
            client
                .create_window(&format!("win{}", i), Rect::new(i * 10, 0, 64, 48), WindowFlags::VISIBLE)
                .unwrap()
        })
        .collect();
    assert_eq!(client.window_count(), 5);

    for &id in ids.iter().rev() {
        client.destroy(id);
    }
    assert_eq!(client.window_count(), 0);
    assert_eq!(client.pools().available(), before);

    assert!(server.wait_for(|reqs| {
        reqs.iter().filter(|m| m.kind == MessageKind::WinDestroy).count() == 5
    }));
    let destroyed: Vec<WinId> = server
        .requests()
        .iter()
        .filter(|m| m.kind == MessageKind::WinDestroy)
        .map(|m| m.src)
        .collect();
    let reversed: Vec<WinId> = ids.iter().rev().copied().collect();
    assert_eq!(destroyed, reversed);
}

#[test]
fn test_destroy_takes_widgets_with_it() {
    let (client, _server, _shm) = common::connect();
    let log: Arc<Mutex<Vec<String>>> = Default::default();
    let top = client
        .create_window("top", Rect::new(0, 0, 100, 100), WindowFlags::VISIBLE)
        .unwrap();
    let panel = client
        .add_widget(
            top,
            Rect::new(0, 0, 50, 50),
            WindowFlags::VISIBLE,
            LayoutHints::default(),
            common::Recorder::boxed("panel", &log),
        )
        .unwrap();
    client
        .add_widget(
            panel,
            Rect::new(0, 0, 10, 10),
            WindowFlags::VISIBLE,
            LayoutHints::default(),
            common::Recorder::boxed("button", &log),
        )
        .unwrap();
    assert_eq!(client.window_count(), 3);

    client.destroy(top);
    assert_eq!(client.window_count(), 0);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["button:destroy".to_string(), "panel:destroy".to_string()]
    );
}

#[test]
fn test_failed_create_sets_last_error() {
    let (client, server, shm) = common::connect();
    server.behaviour.lock().unwrap().fail_next_create = Some(Errno::ENOMEM as i32);

    let result = client.create_window("doomed", Rect::new(0, 0, 10, 10), WindowFlags::NONE);
    match result {
        Err(ClientError::Server { errno, .. }) => assert_eq!(errno, Errno::ENOMEM),
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(client.last_error(), Some(Errno::ENOMEM));
    assert_eq!(client.window_count(), 0);
    assert!(shm.entries().is_empty());
}

#[test]
fn test_resize_attaches_new_canvas_before_detaching_old() {
    let (client, server, shm) = common::connect();
    let id = client
        .create_window("resize", Rect::new(10, 10, 100, 50), WindowFlags::VISIBLE)
        .unwrap();

    client.resize(id, Rect::new(10, 10, 150, 60)).unwrap();

    assert_eq!(shm.entries(), vec!["attach 1", "attach 2", "detach 1"]);
    assert_eq!(client.with_window(id, |w| w.rect), Some(Rect::new(10, 10, 150, 60)));
    assert_eq!(
        client.with_window(id, |w| w.canvas.as_ref().map(|c| (c.handle(), c.width(), c.height()))),
        Some(Some((2, 150, 60)))
    );

    assert!(server.wait_for(|reqs| reqs.iter().any(|m| m.kind == MessageKind::WinResizeFinalize)));
    let kinds = server.kinds();
    let accept = kinds.iter().position(|k| *k == MessageKind::WinResizeAccept).unwrap();
    let finalize = kinds.iter().position(|k| *k == MessageKind::WinResizeFinalize).unwrap();
    assert!(accept < finalize);
}

#[test]
fn test_resize_with_same_handle_never_reattaches() {
    let (client, server, shm) = common::connect();
    server.behaviour.lock().unwrap().resize_keeps_handle = true;
    let id = client
        .create_window("resize", Rect::new(10, 10, 100, 50), WindowFlags::VISIBLE)
        .unwrap();

    client.resize(id, Rect::new(10, 10, 80, 40)).unwrap();

    assert_eq!(shm.entries(), vec!["attach 1"]);
    assert_eq!(client.with_window(id, |w| w.rect), Some(Rect::new(10, 10, 80, 40)));
    assert_eq!(
        client.with_window(id, |w| w.canvas.as_ref().map(|c| (c.width(), c.height()))),
        Some(Some((80, 40)))
    );
}

#[test]
fn test_shutdown_releases_everything() {
    let (client, server, shm) = common::connect();
    let first = client
        .create_window("first", Rect::new(0, 0, 20, 20), WindowFlags::VISIBLE)
        .unwrap();
    let second = client
        .create_window("second", Rect::new(0, 0, 20, 20), WindowFlags::VISIBLE)
        .unwrap();
    let res = client.load_resource("icons/app.png").unwrap();

    client.shutdown();
    assert_eq!(client.window_count(), 0);
    assert_eq!(shm.entries(), vec!["attach 1", "attach 2", "detach 2", "detach 1"]);

    assert!(server.wait_for(|reqs| reqs.iter().any(|m| m.kind == MessageKind::ResourceUnload)));
    let order: Vec<(MessageKind, WinId)> = server
        .requests()
        .iter()
        .filter(|m| matches!(m.kind, MessageKind::WinDestroy | MessageKind::ResourceUnload))
        .map(|m| (m.kind, m.src))
        .collect();
    assert_eq!(
        order,
        vec![
            (MessageKind::WinDestroy, second),
            (MessageKind::WinDestroy, first),
            (MessageKind::ResourceUnload, WinId::ROOT),
        ]
    );
    let unload = server
        .requests()
        .into_iter()
        .find(|m| m.kind == MessageKind::ResourceUnload)
        .unwrap();
    assert_eq!(unload.resource().map(|r| r.id), Some(res));

    let again = client.create_window("late", Rect::new(0, 0, 20, 20), WindowFlags::NONE);
    assert!(matches!(again, Err(ClientError::NotConnected)));
    assert_eq!(client.last_error(), Some(Errno::ENOTCONN));
}

#[test]
fn test_requests_round_trip() {
    let (client, server, _shm) = common::connect();
    server.behaviour.lock().unwrap().palette = vec![0xff000000, 0xffffffff];
    let id = client
        .create_window("misc", Rect::new(5, 6, 30, 40), WindowFlags::VISIBLE)
        .unwrap();

    let attrs = client.get_attributes(id).unwrap();
    assert_eq!(attrs.rect, Rect::new(5, 6, 30, 40));
    assert!(attrs.flags.contains(WindowFlags::VISIBLE));

    client.grab_mouse(id).unwrap();
    client.ungrab_mouse(id).unwrap();

    let res = client.load_resource("fonts/mono.bin").unwrap();
    assert_eq!(client.get_resource(res).unwrap(), format!("resource-{}", res).into_bytes());
    client.unload_resource(res).unwrap();

    assert!(!client.clipboard_query(1).unwrap());
    client.clipboard_set(1, b"hello").unwrap();
    assert!(client.clipboard_query(1).unwrap());
    assert_eq!(client.clipboard_get(1).unwrap(), b"hello");

    assert_eq!(client.color_palette().unwrap(), vec![0xff000000, 0xffffffff]);

    client.set_title(id, "renamed").unwrap();
    assert_eq!(client.with_window(id, |w| w.title.clone()), Some("renamed".to_string()));
    assert!(server.wait_for(|reqs| {
        reqs.iter()
            .any(|m| m.kind == MessageKind::WinSetTitle && m.data == b"renamed")
    }));
}

#[test]
fn test_icon_size_overflow_is_rejected() {
    let (client, server, _shm) = common::connect();
    let id = client
        .create_window("icon", Rect::new(0, 0, 20, 20), WindowFlags::VISIBLE)
        .unwrap();

    let result = client.set_icon(id, u32::MAX, 2, &[0; 4]);
    assert!(matches!(result, Err(ClientError::Protocol(_))));
    assert!(client.set_icon(id, 2, 2, &[0xff00_0000; 4]).is_ok());

    assert!(server.wait_for(|reqs| reqs.iter().any(|m| m.kind == MessageKind::WinSetIcon)));
    let icons = server
        .requests()
        .iter()
        .filter(|m| m.kind == MessageKind::WinSetIcon)
        .count();
    assert_eq!(icons, 1);
}

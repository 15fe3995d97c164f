// Integration tests for the topic-keyed event bus
//
// These tests verify delivery order, topic isolation and that handlers can
// unsubscribe while an event is being dispatched.

use std::sync::{Arc, Mutex};

use voice_relay::events::{EventBus, Subscription};

#[test]
fn test_handlers_run_in_registration_order() {
    let bus: EventBus<u32> = EventBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let _subs: Vec<Subscription> = ["first", "second", "third"]
        .into_iter()
        .map(|name| {
            let log = Arc::clone(&log);
            bus.subscribe("status", move |value: &u32| {
                log.lock().unwrap().push(format!("{}:{}", name, value));
            })
        })
        .collect();

    let delivered = bus.publish("status", &7);

    assert_eq!(delivered, 3);
    assert_eq!(*log.lock().unwrap(), vec!["first:7", "second:7", "third:7"]);
}

#[test]
fn test_topics_are_isolated() {
    let bus: EventBus<String> = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let seen_by_handler = Arc::clone(&seen);
    let _sub = bus.subscribe("transcript", move |text: &String| {
        seen_by_handler.lock().unwrap().push(text.clone());
    });

    assert_eq!(bus.publish("status", &"ignored".to_string()), 0);
    assert_eq!(bus.publish("transcript", &"hello".to_string()), 1);
    assert_eq!(*seen.lock().unwrap(), vec!["hello".to_string()]);
}

#[test]
fn test_unsubscribe_during_publish_keeps_current_snapshot() {
    let bus: EventBus<u32> = EventBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    // The first handler removes the second while the event is being dispatched
    let second: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

    let first_log = Arc::clone(&log);
    let second_slot = Arc::clone(&second);
    let _first = bus.subscribe("status", move |value: &u32| {
        first_log.lock().unwrap().push(("first", *value));
        if let Some(sub) = second_slot.lock().unwrap().as_ref() {
            sub.unsubscribe();
        }
    });

    let second_log = Arc::clone(&log);
    *second.lock().unwrap() = Some(bus.subscribe("status", move |value: &u32| {
        second_log.lock().unwrap().push(("second", *value));
    }));

    // Snapshot taken before dispatch: both handlers see the first event
    assert_eq!(bus.publish("status", &1), 2);
    // The second handler is gone for the next one
    assert_eq!(bus.publish("status", &2), 1);

    assert_eq!(
        *log.lock().unwrap(),
        vec![("first", 1), ("second", 1), ("first", 2)]
    );
}

#[test]
fn test_handler_may_unsubscribe_itself() {
    let bus: EventBus<u32> = EventBus::new();
    let count = Arc::new(Mutex::new(0));
    let own: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

    let handler_count = Arc::clone(&count);
    let handler_own = Arc::clone(&own);
    *own.lock().unwrap() = Some(bus.subscribe("status", move |_: &u32| {
        *handler_count.lock().unwrap() += 1;
        if let Some(sub) = handler_own.lock().unwrap().as_ref() {
            sub.unsubscribe();
        }
    }));

    bus.publish("status", &1);
    bus.publish("status", &2);

    assert_eq!(*count.lock().unwrap(), 1);
    assert_eq!(bus.subscriber_count("status"), 0);
}

#[test]
fn test_unsubscribe_is_idempotent() {
    let bus: EventBus<u32> = EventBus::new();
    let sub = bus.subscribe("status", |_: &u32| {});
    let other = bus.subscribe("status", |_: &u32| {});

    assert!(sub.is_active());
    assert_eq!(sub.topic(), "status");

    sub.unsubscribe();
    sub.unsubscribe();

    assert!(!sub.is_active());
    assert!(other.is_active());
    assert_eq!(bus.subscriber_count("status"), 1);
}

#[test]
fn test_dropping_handle_keeps_handler() {
    let bus: EventBus<u32> = EventBus::new();
    let count = Arc::new(Mutex::new(0));

    let handler_count = Arc::clone(&count);
    drop(bus.subscribe("status", move |_: &u32| {
        *handler_count.lock().unwrap() += 1;
    }));

    bus.publish("status", &1);
    assert_eq!(*count.lock().unwrap(), 1);
}

#[test]
fn test_clones_share_subscribers() {
    let bus: EventBus<u32> = EventBus::new();
    let clone = bus.clone();
    let count = Arc::new(Mutex::new(0));

    let handler_count = Arc::clone(&count);
    let sub = clone.subscribe("status", move |value: &u32| {
        *handler_count.lock().unwrap() += *value;
    });

    assert_eq!(bus.publish("status", &5), 1);
    sub.unsubscribe();
    assert_eq!(bus.publish("status", &5), 0);
    assert_eq!(*count.lock().unwrap(), 5);
}

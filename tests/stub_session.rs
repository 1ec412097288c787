//! End-to-end sessions against the in-process stub server

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use executor_core::tokio::TokioGlobal;
use kstlink::{
    ConnectionState, Error, EventLoop, ExportOptions, Geometry, HistogramOptions, ObjectKind,
    PlotOptions, RemoteFault, RetryPolicy, Session, SessionConfig, SpectrumOptions, StubServer,
    Value, WidgetEvent,
};

fn socket_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "kstlink-{tag}-{}-{}.sock",
        std::process::id(),
        rand::random::<u32>()
    ))
}

async fn start_stub(tag: &str) -> StubServer {
    StubServer::start(socket_path(tag), TokioGlobal)
        .await
        .unwrap()
}

fn connect(path: &Path) -> Session {
    let config = SessionConfig::builder()
        .name("S1")
        .endpoint(path)
        .retry(RetryPolicy::no_retry())
        .call_timeout(Duration::from_secs(10))
        .build();
    Session::connect(config).unwrap()
}

/// Run blocking session code off the async workers
async fn with_session<T: Send + 'static>(
    server: &StubServer,
    body: impl FnOnce(&Session) -> T + Send + 'static,
) -> T {
    let path = server.socket_path().to_path_buf();
    tokio::task::spawn_blocking(move || {
        let session = connect(&path);
        body(&session)
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_plot_and_generated_vector() {
    let server = start_stub("s1").await;

    let values = with_session(&server, |session| {
        assert_eq!(session.state(), ConnectionState::Connected);
        assert!(session.remote_identity().starts_with("kstlink-stub"));

        let plot = session.create(ObjectKind::Plot, []).unwrap();
        assert_eq!(plot.kind(), ObjectKind::Plot);

        let vector = session
            .create(
                ObjectKind::Vector,
                [Value::Float(-1.0), Value::Float(1.0), Value::Int(100)],
            )
            .unwrap();
        assert_eq!(vector.kind(), ObjectKind::Vector);
        assert_eq!(vector.len().unwrap(), 100);
        vector.values().unwrap()
    })
    .await;

    assert_eq!(values.len(), 100);
    let step = 2.0 / 99.0;
    for (i, v) in values.iter().enumerate() {
        assert!((v - (-1.0 + i as f64 * step)).abs() < 1e-12, "sample {i} is {v}");
    }
    assert_eq!(values[0], -1.0);
    assert_eq!(values[99], 1.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bulk_roundtrip_is_bit_exact() {
    let server = start_stub("bulk").await;

    with_session(&server, |session| {
        let vector = session.new_editable_vector(&[]).unwrap();
        for n in [0usize, 1, 500_000] {
            let mut state = 0x9e37_79b9_7f4a_7c15u64;
            let written: Vec<f64> = (0..n)
                .map(|i| match i % 5 {
                    0 => -0.0,
                    1 => f64::MIN_POSITIVE / 3.0,
                    _ => {
                        state ^= state << 13;
                        state ^= state >> 7;
                        state ^= state << 17;
                        f64::from_bits(state)
                    }
                })
                .collect();

            vector.load(&written).unwrap();
            let read = vector.values().unwrap();
            assert_eq!(read.len(), n);
            assert!(
                written
                    .iter()
                    .zip(&read)
                    .all(|(a, b)| a.to_bits() == b.to_bits()),
                "mismatch for n = {n}"
            );
        }
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_quit_closes_session() {
    let server = start_stub("quit").await;

    with_session(&server, |session| {
        let plot = session.new_plot(&PlotOptions::default()).unwrap();
        session.quit().unwrap();

        assert_eq!(session.state(), ConnectionState::Closed);
        assert!(session.transport_closed());
        assert!(matches!(session.call("new_tab", []), Err(Error::SessionClosed)));
        assert!(matches!(session.quit(), Err(Error::SessionClosed)));
        assert!(!plot.is_valid());
        assert!(matches!(plot.name(), Err(Error::StaleHandle { .. })));
    })
    .await;

    server.wait_for_quit().await;
    assert!(server.quit_requested());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_releases_an_idle_listener() {
    let server = start_stub("stop").await;
    let path = server.socket_path().to_path_buf();

    // No connection arrives after `stop`; the listener must still go away
    server.stop();
    tokio::task::spawn_blocking(move || {
        std::thread::sleep(Duration::from_millis(300));
        assert!(std::os::unix::net::UnixStream::connect(&path).is_err());
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_two_subscriptions_fire_independently() {
    let server = start_stub("events").await;

    let (seen_a, seen_b) = with_session(&server, |session| {
        let seen_a = RefCell::new(Vec::new());
        let seen_b = RefCell::new(Vec::new());

        let a = session.new_button("A", &Geometry::default()).unwrap();
        let b = session
            .new_line_edit("", &Geometry::new(0.5, 0.2, 0.2, 0.05))
            .unwrap();

        let mut sub_a = a
            .subscribe(|payload| {
                seen_a.borrow_mut().push(WidgetEvent::parse(payload));
                Ok(())
            })
            .unwrap();
        let mut sub_b = b
            .subscribe(|payload| {
                seen_b.borrow_mut().push(WidgetEvent::parse(payload));
                Ok(())
            })
            .unwrap();

        session
            .call("widget.emit", [Value::from(b.id()), Value::from("valueSet:hello")])
            .unwrap();
        session
            .call("widget.emit", [Value::from(a.id()), Value::from("clicked")])
            .unwrap();

        while seen_a.borrow().is_empty() {
            assert!(sub_a.wait(Some(Duration::from_secs(5))).unwrap());
            sub_a.dispatch().unwrap();
        }
        while seen_b.borrow().is_empty() {
            assert!(sub_b.wait(Some(Duration::from_secs(5))).unwrap());
            sub_b.dispatch().unwrap();
        }
        assert_eq!(sub_a.delivered(), 1);
        assert_eq!(sub_b.delivered(), 1);

        drop(sub_a);
        drop(sub_b);
        (seen_a.into_inner(), seen_b.into_inner())
    })
    .await;

    assert_eq!(seen_a, vec![WidgetEvent::Clicked]);
    assert_eq!(seen_b, vec![WidgetEvent::ValueSet("hello".to_string())]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_event_loop_and_nested_calls() {
    let server = start_stub("loop").await;

    with_session(&server, |session| {
        let clicks = RefCell::new(0u32);
        let button = session.new_button("count", &Geometry::default()).unwrap();
        let label = session.new_line_edit("0", &Geometry::default()).unwrap();

        let subscription = button
            .subscribe(|payload| {
                assert_eq!(WidgetEvent::parse(payload), WidgetEvent::Clicked);
                *clicks.borrow_mut() += 1;
                // Callbacks run between calls and may issue their own
                label.call("set_text", [Value::from(clicks.borrow().to_string())])?;
                Ok(())
            })
            .unwrap();

        let mut events = EventLoop::new().unwrap();
        events.register(subscription).unwrap();
        assert_eq!(events.len(), 1);

        for _ in 0..3 {
            session
                .call("widget.emit", [Value::from(button.id()), Value::from("clicked")])
                .unwrap();
        }
        let finished = events
            .run_until(Some(Duration::from_secs(10)), || *clicks.borrow() == 3)
            .unwrap();
        assert!(finished);

        let text = label.call("get", [Value::from("text")]).unwrap();
        assert_eq!(text, Value::from("3"));
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failing_callback_does_not_starve_other_subscriptions() {
    let server = start_stub("starve").await;

    with_session(&server, |session| {
        let failed = RefCell::new(0u32);
        let clicks = RefCell::new(0u32);
        let broken = session.new_button("broken", &Geometry::default()).unwrap();
        let working = session.new_button("working", &Geometry::default()).unwrap();

        let mut events = EventLoop::new().unwrap();
        events
            .register(
                broken
                    .subscribe(|_| {
                        *failed.borrow_mut() += 1;
                        Err(Error::Protocol("callback rejected the event".into()))
                    })
                    .unwrap(),
            )
            .unwrap();
        events
            .register(
                working
                    .subscribe(|_| {
                        *clicks.borrow_mut() += 1;
                        Ok(())
                    })
                    .unwrap(),
            )
            .unwrap();

        for button in [&broken, &working] {
            session
                .call("widget.emit", [Value::from(button.id()), Value::from("clicked")])
                .unwrap();
        }
        // Let both side channels become readable before the pass
        std::thread::sleep(Duration::from_millis(200));

        let result = events.run_once(Some(Duration::from_secs(5)));
        assert!(matches!(result, Err(Error::Protocol(_))), "{result:?}");
        assert_eq!(*failed.borrow(), 1);
        assert_eq!(*clicks.borrow(), 1);
        assert_eq!(events.len(), 2);

        // Both stay armed after the failure
        session
            .call("widget.emit", [Value::from(working.id()), Value::from("clicked")])
            .unwrap();
        let finished = events
            .run_until(Some(Duration::from_secs(10)), || *clicks.borrow() == 2)
            .unwrap();
        assert!(finished);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_queued_events_follow_a_failed_callback() {
    let server = start_stub("backlog").await;

    with_session(&server, |session| {
        let calls = RefCell::new(0u32);
        let button = session.new_button("flaky", &Geometry::default()).unwrap();
        let subscription = button
            .subscribe(|_| {
                *calls.borrow_mut() += 1;
                if *calls.borrow() == 1 {
                    return Err(Error::Protocol("first click rejected".into()));
                }
                Ok(())
            })
            .unwrap();
        let mut events = EventLoop::new().unwrap();
        events.register(subscription).unwrap();

        for _ in 0..2 {
            session
                .call("widget.emit", [Value::from(button.id()), Value::from("clicked")])
                .unwrap();
        }
        std::thread::sleep(Duration::from_millis(200));

        assert!(events.run_once(Some(Duration::from_secs(5))).is_err());
        assert_eq!(*calls.borrow(), 1);

        // The second click is already queued; no new readiness is needed
        let started = Instant::now();
        assert_eq!(events.run_once(Some(Duration::from_secs(5))).unwrap(), 1);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(*calls.borrow(), 2);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_closed_subscription_leaves_the_loop() {
    let server = start_stub("closedloop").await;

    with_session(&server, |session| {
        let button = session.new_button("gone", &Geometry::default()).unwrap();
        let mut subscription = button.subscribe(|_| Ok(())).unwrap();
        subscription.close();

        let mut events = EventLoop::new().unwrap();
        events.register(subscription).unwrap();

        let started = Instant::now();
        assert_eq!(events.run_once(Some(Duration::from_secs(5))).unwrap(), 0);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(events.is_empty());
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_subscription_closes_when_stub_quits() {
    let server = start_stub("hangup").await;

    with_session(&server, |session| {
        let button = session.new_button("bye", &Geometry::default()).unwrap();
        let mut subscription = button.subscribe(|_| Ok(())).unwrap();
        session.quit().unwrap();

        assert!(subscription.wait(Some(Duration::from_secs(5))).unwrap());
        while !subscription.is_closed() {
            subscription.dispatch().unwrap();
            if !subscription.is_closed() {
                subscription.wait(Some(Duration::from_secs(5))).unwrap();
            }
        }
        assert_eq!(subscription.delivered(), 0);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_subscribe_to_non_widget_fails() {
    let server = start_stub("nonwidget").await;

    with_session(&server, |session| {
        let plot = session.new_plot(&PlotOptions::default()).unwrap();
        assert!(matches!(
            plot.subscribe(|_| Ok(())),
            Err(Error::WrongKind { .. })
        ));

        let result = session.subscribe("P404", |_| Ok(()));
        assert!(matches!(
            result,
            Err(Error::Remote { code: RemoteFault::UNKNOWN_OBJECT, .. })
        ));
    })
    .await;

    assert_eq!(server.emit("B1", "clicked"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_errors_are_verbatim() {
    let server = start_stub("errors").await;

    with_session(&server, |session| {
        match session.call("frobnicate", [Value::Int(1)]) {
            Err(Error::Remote { code, message }) => {
                assert_eq!(code, RemoteFault::UNKNOWN_COMMAND);
                assert_eq!(message, "unknown command 'frobnicate'");
            }
            other => panic!("expected a remote error, got {other:?}"),
        }

        let x = session.new_generated_vector(0.0, 1.0, 10).unwrap();
        match session.new_equation(&x, "(x + 1") {
            Err(Error::Remote { code, message }) => {
                assert_eq!(code, RemoteFault::INVALID_ARGUMENT);
                assert!(message.contains("(x + 1"), "{message}");
            }
            other => panic!("expected a remote error, got {other:?}"),
        }

        // Errors leave the session usable
        assert!(session.is_connected());
        assert_eq!(x.len().unwrap(), 10);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deleted_and_mismatched_handles() {
    let server = start_stub("handles").await;

    with_session(&server, |session| {
        let plot = session.new_plot(&PlotOptions::default()).unwrap();
        assert!(matches!(plot.values(), Err(Error::WrongKind { .. })));

        let vector = session.new_editable_vector(&[1.0, 2.0]).unwrap();
        let copy = vector.clone();
        vector.delete().unwrap();
        assert!(matches!(
            copy.values(),
            Err(Error::Remote { code: RemoteFault::UNKNOWN_OBJECT, .. })
        ));
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_handles_from_another_session_are_rejected() {
    let server = start_stub("foreign").await;
    let path = server.socket_path().to_path_buf();

    tokio::task::spawn_blocking(move || {
        let first = connect(&path);
        let second = connect(&path);
        let x = first.new_generated_vector(0.0, 1.0, 3).unwrap();
        assert!(matches!(
            second.new_equation(&x, "x"),
            Err(Error::StaleHandle { .. })
        ));

        let curve = first.new_curve(&x, &x).unwrap();
        let y = second.new_generated_vector(0.0, 1.0, 3).unwrap();
        let own_curve = second.new_curve(&y, &y).unwrap();
        let plot = second.new_plot(&PlotOptions::default()).unwrap();
        assert!(matches!(plot.add(&curve), Err(Error::StaleHandle { .. })));
        plot.add(&own_curve).unwrap();
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_export() {
    let server = start_stub("export").await;
    let target = std::env::temp_dir().join(format!("kstlink-export-{}.png", rand::random::<u32>()));

    let written = target.clone();
    with_session(&server, move |session| {
        session.new_plot(&PlotOptions::default()).unwrap();
        session.export(&written, &ExportOptions::default()).unwrap();

        let options = ExportOptions {
            autosave_period: Some(Duration::from_millis(200)),
            ..ExportOptions::default()
        };
        assert!(matches!(
            session.export(&written, &options),
            Err(Error::InvalidOption { .. })
        ));

        match session.export("/nonexistent-kstlink-dir/out.png", &ExportOptions::default()) {
            Err(Error::ExportFailed { path, message }) => {
                assert_eq!(path, PathBuf::from("/nonexistent-kstlink-dir/out.png"));
                assert!(message.contains("/nonexistent-kstlink-dir/out.png"), "{message}");
            }
            other => panic!("expected ExportFailed, got {other:?}"),
        }
    })
    .await;

    let contents = std::fs::read_to_string(&target).unwrap();
    assert!(contents.contains("size=1280x1024"));
    std::fs::remove_file(&target).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_data_objects() {
    let server = start_stub("dataobjects").await;

    with_session(&server, |session| {
        let plot = session
            .new_plot(&PlotOptions {
                font_size: Some(12.0),
                ..PlotOptions::default()
            })
            .unwrap();
        assert_eq!(plot.call("get", [Value::from("font_size")]).unwrap(), Value::Float(12.0));

        let x = session.new_generated_vector(0.0, 4.0, 5).unwrap();
        let eq = session.new_equation(&x, "x^2 + 1").unwrap();
        assert_eq!(eq.y().unwrap().values().unwrap(), vec![1.0, 2.0, 5.0, 10.0, 17.0]);
        assert_eq!(eq.x().unwrap().values().unwrap(), x.values().unwrap());

        let curve = session.new_curve(&eq.x().unwrap(), &eq.y().unwrap()).unwrap();
        curve.set_color("red").unwrap();
        curve.set_line_width(2).unwrap();
        curve.set_has_bars(true).unwrap();
        curve.set_bar_fill_color("green").unwrap();
        plot.add(&curve).unwrap();
        assert!(matches!(curve.add(&plot), Err(Error::WrongKind { .. })));

        let step = session.new_generated_scalar(0.5).unwrap();
        let sum = session.new_sum_filter(&x, &step).unwrap();
        assert_eq!(
            sum.output_sum().unwrap().values().unwrap(),
            vec![0.0, 0.5, 1.5, 3.0, 5.0]
        );

        let samples = session.new_generated_vector(0.0, 1.0, 1000).unwrap();
        let histogram = session
            .new_histogram(
                &samples,
                &HistogramOptions {
                    num_bins: 10,
                    ..HistogramOptions::default()
                },
            )
            .unwrap();
        let counts = histogram.y().unwrap().values().unwrap();
        assert_eq!(counts.len(), 10);
        assert_eq!(counts.iter().sum::<f64>(), 1000.0);

        let spectrum = session
            .new_spectrum(&samples, &SpectrumOptions::default())
            .unwrap();
        // 1000 samples fit in one 2^10 window: n/2 + 1 frequency bins
        assert_eq!(spectrum.x().unwrap().len().unwrap(), 501);

        let circle = session.new_circle((0.5, 0.5), 0.1, "blue").unwrap();
        circle.set_stroke_width(3.0).unwrap();
        assert_eq!(circle.kind(), ObjectKind::Circle);

        assert_eq!(session.new_tab().unwrap(), 2);
        session.cleanup_layout(2).unwrap();
        assert!(session.cleanup_layout(0).is_err());
    })
    .await;

    assert!(server.object_count() > 10);
}

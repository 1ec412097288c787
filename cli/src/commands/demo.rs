use std::cell::{Cell, RefCell};
use std::f64::consts::PI;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use kstlink::{
    DataVectorOptions, Error, EventLoop, ExportOptions, Geometry, HistogramOptions, PlotOptions,
    Session, SpectrumOptions, StubServer, WidgetEvent,
};
use rand::Rng;

use crate::cli::{Demo, DemoArgs};
use crate::commands::stub::HostedStub;
use crate::config::MergedConfig;
use crate::error::CliResult;

pub fn execute(args: DemoArgs, config: MergedConfig) -> CliResult<()> {
    let hosted = if args.with_stub {
        Some(HostedStub::start(&config.session.endpoint())?)
    } else {
        None
    };
    let stub = hosted.as_ref().map(HostedStub::server);

    let name = config.session.name().to_string();
    let session = Session::connect(config.session)
        .with_context(|| format!("failed to reach session '{name}'"))?;
    tracing::info!(
        session = %name,
        remote = session.remote_identity(),
        demo = ?args.demo,
        "connected"
    );

    match args.demo {
        Demo::DataObjects => data_objects(&session, args.data.as_deref())?,
        Demo::VectorIo => vector_io(&session)?,
        Demo::Export => export(&session, &args.output, &config.export)?,
        Demo::Quit => session.quit().context("failed to send quit")?,
        Demo::Button => button(&session, &args, stub)?,
        Demo::TextInput => text_input(&session, &args, stub)?,
    }

    if let Some(stub) = stub {
        tracing::info!(objects = stub.object_count(), "stub finished");
    }
    Ok(())
}

/// Five plots showing every kind of data object
fn data_objects(session: &Session, data: Option<&Path>) -> CliResult<()> {
    let data = match data {
        Some(path) => std::path::absolute(path)
            .with_context(|| format!("bad data file path: {}", path.display()))?,
        None => write_demo_data()?,
    };

    let plot_options = PlotOptions {
        font_size: Some(12.0),
        ..PlotOptions::default()
    };
    let mut plots = Vec::with_capacity(5);
    for _ in 0..5 {
        let plot = session.new_plot(&plot_options)?;
        plot.set_stroke_width(1.0)?;
        plots.push(plot);
    }
    session.cleanup_layout(2)?;

    let column = |field: &str| -> kstlink::Result<_> {
        let options = DataVectorOptions {
            num_frames: 2000,
            ..DataVectorOptions::field(field)
        };
        session.new_data_vector(&data, &options)
    };
    let dv1 = column("Column 1")?;
    let dv2 = column("Column 2")?;
    let dv3 = column("Column 3")?;

    let c1 = session.new_curve(&dv1, &dv2)?;
    c1.set_color("red")?;
    c1.set_line_width(2)?;
    plots[0].add(&c1)?;

    // x^2 from -1 to 1
    let gv1 = session.new_generated_vector(-1.0, 1.0, 100)?;
    let eq1 = session.new_equation(&gv1, "x^2")?;
    let c2 = session.new_curve(&eq1.x()?, &eq1.y()?)?;
    c2.set_color("green")?;
    c2.set_line_width(2)?;
    plots[1].add(&c2)?;

    let sp1 = session.new_spectrum(
        &dv2,
        &SpectrumOptions {
            sample_rate: 60.0,
            interleaved_average: true,
            fft_length: 9,
            output_type: 3,
            ..SpectrumOptions::default()
        },
    )?;
    let c3 = session.new_curve(&sp1.x()?, &sp1.y()?)?;
    c3.set_color("blue")?;
    c3.set_line_width(2)?;
    plots[2].add(&c3)?;

    let h1 = session.new_histogram(&dv2, &HistogramOptions::default())?;
    let c4 = session.new_curve(&h1.x()?, &h1.y()?)?;
    c4.set_color("black")?;
    c4.set_line_width(1)?;
    c4.set_bar_fill_color("dark green")?;
    c4.set_has_bars(true)?;
    c4.set_has_lines(false)?;
    plots[3].add(&c4)?;

    let fft_length = session.new_generated_scalar(10.0)?;
    let rate = session.new_generated_scalar(60.0)?;
    let xs1 = session.new_cross_spectrum(&dv2, &dv3, &fft_length, &rate)?;
    let c5 = session.new_curve(&xs1.x()?, &xs1.y()?)?;
    c5.set_color("green")?;
    c5.set_line_width(1)?;
    plots[2].add(&c5)?;

    let step = session.new_generated_scalar(1.0)?;
    let sum1 = session.new_sum_filter(&gv1, &step)?;
    let c6 = session.new_curve(&gv1, &sum1.output_sum()?)?;
    c6.set_color("green")?;
    c6.set_line_width(1)?;
    plots[4].add(&c6)?;

    println!("data objects from {} plotted", data.display());
    Ok(())
}

/// Three noisy columns sampled at 60 Hz
fn write_demo_data() -> CliResult<PathBuf> {
    let path = std::env::temp_dir().join(format!("kstlink-demodata-{}.dat", std::process::id()));
    let mut rng = rand::thread_rng();
    let mut text = String::from("# time signal reference\n");
    for i in 0..2000u32 {
        let t = f64::from(i) / 60.0;
        let signal = (2.0 * PI * 5.0 * t).sin() + rng.gen_range(-0.3..0.3);
        let reference = (2.0 * PI * 5.0 * t).cos() + rng.gen_range(-0.3..0.3);
        let _ = writeln!(text, "{t:.6} {signal:.6} {reference:.6}");
    }
    std::fs::write(&path, text)
        .with_context(|| format!("failed to write demo data: {}", path.display()))?;
    tracing::debug!(path = %path.display(), "demo data written");
    Ok(path)
}

/// Half a million samples each way
fn vector_io(session: &Session) -> CliResult<()> {
    let t0 = Instant::now();

    let count: u32 = 500_000;
    let x: Vec<f64> = (0..count)
        .map(|i| 50.0 * f64::from(i) / f64::from(count - 1))
        .collect();
    let y: Vec<f64> = x.iter().map(|v| v.sin()).collect();

    let t1 = Instant::now();

    let v1 = session.new_editable_vector(&x)?;
    let v2 = session.new_editable_vector(&y)?;
    let c1 = session.new_curve(&v1, &v2)?;
    let p1 = session.new_plot(&PlotOptions::default())?;
    p1.add(&c1)?;

    let t2 = Instant::now();

    let mut a = v2.values()?;

    let t3 = Instant::now();

    a.iter_mut().for_each(|v| *v *= *v);
    let v3 = session.new_editable_vector(&a)?;
    let c2 = session.new_curve(&v1, &v3)?;
    p1.add(&c2)?;

    a.iter_mut().for_each(|v| *v /= 2.0);
    v2.load(&a)?;

    println!("creation of the arrays took {:?}", t1 - t0);
    println!("copying into the plotting process and plotting took {:?}", t2 - t1);
    println!("copying back took {:?}", t3 - t2);
    Ok(())
}

/// sin(x) and cos(x) on two tabs, then every tab exported
fn export(session: &Session, output: &Path, defaults: &ExportOptions) -> CliResult<()> {
    let v1 = session.new_generated_vector(-10.0, 10.0, 1000)?;
    for (index, expression) in ["sin(x)", "cos(x)"].into_iter().enumerate() {
        if index > 0 {
            session.new_tab()?;
        }
        let e1 = session.new_equation(&v1, expression)?;
        let c1 = session.new_curve(&e1.x()?, &e1.y()?)?;
        let p1 = session.new_plot(&PlotOptions::default())?;
        p1.add(&c1)?;
    }

    let output = std::path::absolute(output)
        .with_context(|| format!("bad output path: {}", output.display()))?;
    let options = ExportOptions {
        all_tabs: true,
        autosave_period: Some(Duration::from_secs(5)),
        ..defaults.clone()
    };
    session.export(&output, &options)?;
    println!("exported to {}", output.display());
    Ok(())
}

/// Pressing the button draws a random circle
fn button(session: &Session, args: &DemoArgs, stub: Option<&StubServer>) -> CliResult<()> {
    let clicks = Cell::new(0u64);
    let button = session.new_button("Click Here", &Geometry::new(0.5, 0.5, 0.2, 0.1))?;

    let subscription = button.subscribe(|payload| {
        if WidgetEvent::parse(payload) != WidgetEvent::Clicked {
            return Ok(());
        }
        let mut rng = rand::thread_rng();
        let color = format!(
            "#{}{}{}",
            rng.gen_range(0..10),
            rng.gen_range(0..10),
            rng.gen_range(0..10)
        );
        let center = (rng.r#gen::<f64>(), rng.r#gen::<f64>());
        let circle = session.new_circle(center, rng.r#gen::<f64>() / 10.0, &color)?;
        tracing::debug!(id = circle.id(), color = %color, "circle drawn");
        clicks.set(clicks.get() + 1);
        Ok(())
    })?;

    let mut events = EventLoop::new()?;
    events.register(subscription)?;

    let mut limit = args.events;
    if let Some(stub) = stub {
        limit = limit.max(1);
        for _ in 0..limit {
            stub.emit(button.id(), "clicked");
        }
    }

    run_events(&mut events, limit, args.duration, &clicks)?;
    println!("{} circles drawn", clicks.get());
    Ok(())
}

/// Typing an equation and pressing "Go!" plots it
fn text_input(session: &Session, args: &DemoArgs, stub: Option<&StubServer>) -> CliResult<()> {
    let text = RefCell::new(String::new());
    let handled = Cell::new(0u64);

    let line_edit = session.new_line_edit("", &Geometry::new(0.47, 0.975, 0.93, 0.025))?;
    let go = session.new_button("Go!", &Geometry::new(0.97, 0.975, 0.05, 0.025))?;
    let plot = session.new_plot(&PlotOptions {
        position: Some((0.5, 0.4885)),
        size: Some((0.9, 0.8)),
        ..PlotOptions::default()
    })?;
    let x = session.new_generated_vector(-100.0, 100.0, 1000)?;

    let value_set = line_edit.subscribe(|payload| {
        if let WidgetEvent::ValueSet(value) = WidgetEvent::parse(payload) {
            tracing::debug!(value = %value, "equation text changed");
            *text.borrow_mut() = value;
            handled.set(handled.get() + 1);
        }
        Ok(())
    })?;
    let create = go.subscribe(|payload| {
        if WidgetEvent::parse(payload) != WidgetEvent::Clicked {
            return Ok(());
        }
        handled.set(handled.get() + 1);
        let expression = text.borrow().clone();
        if expression.is_empty() {
            tracing::warn!("no equation entered yet");
            return Ok(());
        }
        match session.new_equation(&x, &expression) {
            Ok(eq) => {
                let curve = session.new_curve(&eq.x()?, &eq.y()?)?;
                plot.add(&curve)?;
                println!("plotted {expression}");
                Ok(())
            }
            Err(Error::Remote { message, .. }) => {
                tracing::warn!(expression = %expression, message = %message, "equation rejected");
                Ok(())
            }
            Err(e) => Err(e),
        }
    })?;

    let mut events = EventLoop::new()?;
    events.register(value_set)?;
    events.register(create)?;

    let mut limit = args.events;
    if let Some(stub) = stub {
        // The click reads the text, so it only goes out once the text was seen
        stub.emit(line_edit.id(), "valueSet:x^2/100");
        events.run_until(Some(Duration::from_secs(args.duration)), || handled.get() >= 1)?;
        stub.emit(go.id(), "clicked");
        limit = limit.max(2);
    }

    run_events(&mut events, limit, args.duration, &handled)
}

/// Dispatch until `limit` events were handled (0 means no limit) or `duration` seconds passed
fn run_events(
    events: &mut EventLoop<'_>,
    limit: u64,
    duration: u64,
    handled: &Cell<u64>,
) -> CliResult<()> {
    let finished = events.run_until(Some(Duration::from_secs(duration)), || {
        limit > 0 && handled.get() >= limit
    })?;
    if !finished {
        tracing::info!(handled = handled.get(), "demo time is up");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kstlink::{RetryPolicy, SessionConfig};

    fn demo_args(demo: Demo, events: u64) -> DemoArgs {
        DemoArgs {
            demo,
            with_stub: true,
            data: None,
            output: PathBuf::from("unused.png"),
            events,
            duration: 10,
        }
    }

    fn with_stub(tag: &str, f: impl FnOnce(&Session, &StubServer)) {
        let endpoint = std::env::temp_dir().join(format!(
            "kstlink-cli-{tag}-{}-{}.sock",
            std::process::id(),
            rand::random::<u32>()
        ));
        let hosted = HostedStub::start(&endpoint).unwrap();
        let config = SessionConfig::builder()
            .name(tag)
            .endpoint(&endpoint)
            .retry(RetryPolicy::no_retry())
            .build();
        let session = Session::connect(config).unwrap();
        f(&session, hosted.server());
    }

    #[test]
    fn test_data_objects_demo() {
        with_stub("data", |session, stub| {
            data_objects(session, None).unwrap();
            // Five plots and six curves at least
            assert!(stub.object_count() > 11);
        });
    }

    #[test]
    fn test_vector_io_demo() {
        with_stub("vectors", |session, stub| {
            vector_io(session).unwrap();
            assert!(stub.object_count() >= 6);
        });
    }

    #[test]
    fn test_export_demo_writes_file() {
        let output = std::env::temp_dir().join(format!(
            "kstlink-cli-export-{}-{}.png",
            std::process::id(),
            rand::random::<u32>()
        ));
        with_stub("export", |session, _| {
            export(session, &output, &ExportOptions::default()).unwrap();
        });
        assert!(output.exists());
        let _ = std::fs::remove_file(&output);
    }

    #[test]
    fn test_button_demo_draws_one_circle_per_click() {
        with_stub("button", |session, stub| {
            let before = stub.object_count();
            button(session, &demo_args(Demo::Button, 3), Some(stub)).unwrap();
            // The button and three circles
            assert_eq!(stub.object_count(), before + 4);
        });
    }

    #[test]
    fn test_text_input_demo_plots_the_equation() {
        with_stub("text", |session, stub| {
            let before = stub.object_count();
            text_input(session, &demo_args(Demo::TextInput, 0), Some(stub)).unwrap();
            // Widgets, plot and x; then the equation with its two outputs and the curve
            assert_eq!(stub.object_count(), before + 8);
        });
    }

    #[test]
    fn test_quit_demo_ends_stub() {
        with_stub("quit", |session, stub| {
            session.quit().unwrap();
            // quit does not wait for an answer
            let deadline = Instant::now() + Duration::from_secs(5);
            while !stub.quit_requested() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            assert!(stub.quit_requested());
        });
    }
}

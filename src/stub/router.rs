//! Command dispatch for the stub server

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use crate::codec::{RemoteFault, Value};
use crate::handle::ObjectKind;

use super::StubState;
use super::analysis::{self, AsciiTable};
use super::store::{Options, Outcome, Prepared, arg, arg_str, float_samples};

/// One decoded request
#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub command: String,
    pub args: Vec<Value>,
    pub options: Vec<(String, Value)>,
}

impl Call {
    /// Object kind named by the command prefix, as in `vector.values`
    pub fn kind(&self) -> Result<ObjectKind, RemoteFault> {
        self.command
            .split_once('.')
            .and_then(|(kind, _)| kind.parse().ok())
            .ok_or_else(|| unknown_command(&self.command))
    }

    pub fn method(&self) -> &str {
        self.command
            .split_once('.')
            .map_or(self.command.as_str(), |(_, method)| method)
    }

    /// Id of the object the command acts on
    pub fn target(&self) -> Result<&str, RemoteFault> {
        arg_str(&self.command, &self.args, 0)
    }

    fn options(&self) -> Options<'_> {
        Options(&self.options)
    }
}

fn unknown_command(command: &str) -> RemoteFault {
    RemoteFault::new(
        RemoteFault::UNKNOWN_COMMAND,
        format!("unknown command '{command}'"),
    )
}

fn invalid(message: impl Into<String>) -> RemoteFault {
    RemoteFault::new(RemoteFault::INVALID_ARGUMENT, message)
}

type HandlerFuture = Pin<Box<dyn Future<Output = Outcome> + Send>>;

/// Type-erased handler function
type ErasedHandler = Box<dyn Fn(Arc<StubState>, Call) -> HandlerFuture + Send + Sync>;

/// Routes commands to handlers
///
/// Patterns are exact command names, `*.<method>` for a method every object
/// kind shares, or `*.set_*` for property setters. Exact names win.
pub(crate) struct Router {
    handlers: HashMap<String, ErasedHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<F, Fut>(mut self, pattern: &str, handler: F) -> Self
    where
        F: Fn(Arc<StubState>, Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let handler: ErasedHandler = Box::new(move |state, call| Box::pin(handler(state, call)));
        self.handlers.insert(pattern.to_string(), handler);
        self
    }

    fn resolve(&self, command: &str) -> Option<&ErasedHandler> {
        if let Some(handler) = self.handlers.get(command) {
            return Some(handler);
        }
        let (kind, method) = command.split_once('.')?;
        kind.parse::<ObjectKind>().ok()?;
        self.handlers.get(&format!("*.{method}")).or_else(|| {
            if method.starts_with("set_") {
                self.handlers.get("*.set_*")
            } else {
                None
            }
        })
    }

    pub async fn handle(&self, state: Arc<StubState>, call: Call) -> Outcome {
        match self.resolve(&call.command) {
            Some(handler) => handler(state, call).await,
            None => Err(unknown_command(&call.command)),
        }
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Every command the stub understands
pub(crate) fn stub_router() -> Router {
    Router::new()
        .register("hello", |state, call| async move {
            let client = call.args.first().and_then(Value::as_str).unwrap_or("?");
            tracing::info!(client, "client said hello");
            Ok(Value::from(state.identity()))
        })
        .register("quit", |state, _call| async move {
            state.request_quit();
            Ok(Value::Nil)
        })
        .register("new_tab", |state, _call| async move { state.store().new_tab() })
        .register("cleanup_layout", |_state, call| async move {
            let columns = arg(&call.command, &call.args, 0)?
                .as_i64()
                .filter(|&n| n >= 1)
                .ok_or_else(|| invalid("cleanup_layout: columns must be a positive integer"))?;
            tracing::debug!(columns, "layout cleaned up");
            Ok(Value::Nil)
        })
        .register("export_graphics_file", |_state, call| export(call))
        .register("widget.subscribe", |state, call| async move {
            state.store().widget(call.target()?).map(|_| Value::Nil)
        })
        .register("widget.emit", |state, call| async move {
            let widget = call.target()?;
            state.store().widget(widget)?;
            let payload = arg_str(&call.command, &call.args, 1)?;
            let delivered = state.emit(widget, payload.as_bytes());
            Ok(Value::Int(delivered as i64))
        })
        .register("vector.create", |state, call| create_vector(state, call))
        .register("*.create", |state, call| async move {
            let kind = call.kind()?;
            create_object(state, kind, &call).await
        })
        .register("*.delete", |state, call| async move {
            state.store().delete(call.kind()?, call.target()?)
        })
        .register("*.name", |state, call| async move {
            state.store().name(call.kind()?, call.target()?)
        })
        .register("*.get", |state, call| async move {
            let property = arg_str(&call.command, &call.args, 1)?;
            state.store().property(call.kind()?, call.target()?, property)
        })
        .register("*.set_*", |state, call| async move {
            let kind = call.kind()?;
            let property = call.method().trim_start_matches("set_").to_string();
            let value = arg(&call.command, &call.args, 1)?.clone();
            state
                .store()
                .set_property(kind, call.target()?, &property, value)
        })
        .register("plot.add", |state, call| async move {
            let item = arg_str(&call.command, &call.args, 1)?;
            state.store().add_to_plot(call.target()?, item)
        })
        .register("vector.values", |state, call| async move {
            state.store().values(call.target()?)
        })
        .register("vector.load", |state, call| async move {
            let values = float_samples(&call.command, arg(&call.command, &call.args, 1)?)?;
            state.store().load(call.target()?, values)
        })
        .register("vector.length", |state, call| async move {
            state.store().length(call.target()?)
        })
        .register("*.x", |state, call| async move {
            state.store().output(call.kind()?, call.target()?, "x")
        })
        .register("*.y", |state, call| async move {
            state.store().output(call.kind()?, call.target()?, "y")
        })
        .register("*.output", |state, call| async move {
            let output = arg_str(&call.command, &call.args, 1)?;
            state.store().output(call.kind()?, call.target()?, output)
        })
}

/// `vector.create` with a file name reads a data source; anything else is an
/// in-memory vector
async fn create_vector(state: Arc<StubState>, call: Call) -> Outcome {
    let Some(Value::Str(source)) = call.args.first() else {
        return create_object(state, ObjectKind::Vector, &call).await;
    };

    let options = call.options();
    let field = options.str("field", "INDEX")?.to_string();
    let start = options.int("start", 0)?;
    let num_frames = options.int("num_frames", -1)?;
    let skip = options.int("skip", 0)?;

    let path = PathBuf::from(source);
    let text = blocking::unblock({
        let path = path.clone();
        move || std::fs::read_to_string(path)
    })
    .await
    .map_err(|e| {
        RemoteFault::new(
            RemoteFault::IO,
            format!("could not read '{}': {e}", path.display()),
        )
    })?;

    let table = AsciiTable::parse(&text).map_err(|e| invalid(format!("{source}: {e}")))?;
    let values = table
        .field(&field)
        .map_err(|e| invalid(format!("{source}: {e}")))?;
    let values = analysis::select_frames(values, start, num_frames, skip);

    let id = state.store().new_data_vector(source, values, &options);
    Ok(Value::Str(id))
}

/// Create an object, computing its samples on the blocking pool
async fn create_object(state: Arc<StubState>, kind: ObjectKind, call: &Call) -> Outcome {
    let prepared = state.store().prepare(kind, &call.args, &call.options())?;
    let id = match prepared {
        Prepared::Stored(id) => id,
        Prepared::Derive(derivation) => {
            let derived = blocking::unblock(move || derivation.run()).await;
            state.store().insert_derived(derived)
        }
    };
    Ok(Value::Str(id))
}

/// Write a placeholder image description to the requested path
async fn export(call: Call) -> Outcome {
    let path = PathBuf::from(arg_str(&call.command, &call.args, 0)?);
    let options = call.options();
    let width = options.int("width", 1280)?;
    let height = options.int("height", 1024)?;
    let all_tabs = options.bool("all_tabs", false)?;
    if width <= 0 || height <= 0 {
        return Err(invalid("export size must be positive"));
    }
    if options.int("autosave_period", 1)? < 1 {
        return Err(invalid("autosave period must be at least one second"));
    }
    let format = match options.str("format", "")? {
        "" => path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("png")
            .to_string(),
        format => format.to_string(),
    };

    let contents = format!(
        "kstlink-stub export\nformat={format}\nsize={width}x{height}\nall_tabs={all_tabs}\n"
    );
    blocking::unblock({
        let path = path.clone();
        move || std::fs::write(path, contents)
    })
    .await
    .map_err(|e| {
        RemoteFault::new(
            RemoteFault::IO,
            format!("could not write '{}': {e}", path.display()),
        )
    })?;

    tracing::info!(path = %path.display(), format = %format, "exported");
    Ok(Value::Nil)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(command: &str, args: Vec<Value>) -> Call {
        Call {
            command: command.to_string(),
            args,
            options: Vec::new(),
        }
    }

    async fn run(
        router: &Router,
        state: &Arc<StubState>,
        command: &str,
        args: Vec<Value>,
    ) -> Outcome {
        router.handle(Arc::clone(state), call(command, args)).await
    }

    #[test]
    fn test_call_parts() {
        let c = call("vector.values", vec![Value::from("V1")]);
        assert_eq!(c.kind().unwrap(), ObjectKind::Vector);
        assert_eq!(c.method(), "values");
        assert_eq!(c.target().unwrap(), "V1");

        let c = call("teapot.brew", vec![]);
        assert_eq!(c.kind().unwrap_err().code, RemoteFault::UNKNOWN_COMMAND);
        assert_eq!(c.target().unwrap_err().code, RemoteFault::INVALID_ARGUMENT);
    }

    #[tokio::test]
    async fn test_router_dispatch() {
        let router = stub_router();
        let state = StubState::new_for_test();

        let plot = run(&router, &state, "plot.create", vec![]).await.unwrap();
        assert_eq!(plot, Value::from("P1"));

        let v = run(&router, &state, "vector.create", vec![Value::from(vec![1.0, 2.0])])
            .await
            .unwrap();
        let len = run(&router, &state, "vector.length", vec![v.clone()]).await.unwrap();
        assert_eq!(len, Value::Int(2));

        run(&router, &state, "vector.set_color", vec![v.clone(), Value::from("red")])
            .await
            .unwrap();
        let color = run(&router, &state, "vector.get", vec![v, Value::from("color")])
            .await
            .unwrap();
        assert_eq!(color, Value::from("red"));
    }

    #[tokio::test]
    async fn test_router_unknown_command() {
        let router = stub_router();
        let state = StubState::new_for_test();

        for command in ["frobnicate", "teapot.create", "plot.frobnicate"] {
            let fault = run(&router, &state, command, vec![]).await.unwrap_err();
            assert_eq!(fault.code, RemoteFault::UNKNOWN_COMMAND, "{command}");
            assert!(fault.message.contains(command));
        }
    }

    #[tokio::test]
    async fn test_data_vector_from_file() {
        let router = stub_router();
        let state = StubState::new_for_test();
        let path = std::env::temp_dir().join(format!("kstlink-data-{}.txt", rand::random::<u32>()));
        std::fs::write(&path, "t v\n0 10\n1 11\n2 12\n3 13\n").unwrap();

        let mut request = call("vector.create", vec![Value::from(path.to_string_lossy().as_ref())]);
        request.options = vec![
            ("field".to_string(), Value::from("v")),
            ("start".to_string(), Value::Int(1)),
        ];
        let id = router.handle(Arc::clone(&state), request).await.unwrap();
        let values = run(&router, &state, "vector.values", vec![id]).await.unwrap();
        assert_eq!(values, Value::Floats(vec![11.0, 12.0, 13.0]));

        std::fs::remove_file(&path).unwrap();
        let fault = run(
            &router,
            &state,
            "vector.create",
            vec![Value::from(path.to_string_lossy().as_ref())],
        )
        .await
        .unwrap_err();
        assert_eq!(fault.code, RemoteFault::IO);
    }

    #[tokio::test]
    async fn test_export_failure_is_io_fault() {
        let router = stub_router();
        let state = StubState::new_for_test();
        let fault = run(
            &router,
            &state,
            "export_graphics_file",
            vec![Value::from("/nonexistent-kstlink-dir/out.png")],
        )
        .await
        .unwrap_err();
        assert_eq!(fault.code, RemoteFault::IO);
        assert!(fault.message.contains("/nonexistent-kstlink-dir/out.png"));
    }

    #[test]
    fn test_patterns_cover_commands() {
        let router = stub_router();
        let patterns: Vec<&str> = router.patterns().collect();
        for expected in ["hello", "quit", "*.create", "*.set_*", "widget.subscribe"] {
            assert!(patterns.contains(&expected), "{expected}");
        }
    }
}

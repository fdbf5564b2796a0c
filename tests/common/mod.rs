#![allow(dead_code)]

pub mod route_files {
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Write `files` (relative path, content) under a fresh temporary directory.
    pub fn tree(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (relative, content) in files {
            write(dir.path(), relative, content);
        }
        dir
    }

    pub fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
}

pub mod controllers {
    use brrtdispatch::controller::{Controller, ControllerContext};
    use brrtdispatch::error::DispatchError;
    use brrtdispatch::response::{CliResponse, JsonResponse, Response};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Shared log of lifecycle calls.
    pub type Calls = Arc<Mutex<Vec<&'static str>>>;

    pub fn calls() -> Calls {
        Arc::new(Mutex::new(Vec::new()))
    }

    pub fn recorded(calls: &Calls) -> Vec<&'static str> {
        calls.lock().unwrap().clone()
    }

    /// Records every lifecycle step; `pre_run` short-circuits when the route option
    /// `short_circuit` is true.
    pub struct Spy {
        pub calls: Calls,
    }

    impl Controller for Spy {
        fn prepare(&mut self, _ctx: &mut ControllerContext<'_>) -> Result<(), DispatchError> {
            self.calls.lock().unwrap().push("prepare");
            Ok(())
        }

        fn pre_run(
            &mut self,
            ctx: &mut ControllerContext<'_>,
        ) -> Result<Option<Response>, DispatchError> {
            self.calls.lock().unwrap().push("pre_run");
            if ctx.option("short_circuit").and_then(|v| v.as_bool()) == Some(true) {
                return Ok(Some(JsonResponse::new(json!({"cached": true})).into()));
            }
            Ok(None)
        }

        fn run(&mut self, ctx: &mut ControllerContext<'_>) -> Result<Response, DispatchError> {
            self.calls.lock().unwrap().push("run");
            Ok(JsonResponse::new(json!({
                "route": ctx.route().name(),
                "values": ctx.request().path_values().iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect::<std::collections::BTreeMap<_, _>>(),
            }))
            .into())
        }

        fn post_run(
            &mut self,
            _ctx: &mut ControllerContext<'_>,
            response: &mut Response,
        ) -> Result<(), DispatchError> {
            self.calls.lock().unwrap().push("post_run");
            response.head_mut().set_header("X-Post-Run", "1");
            Ok(())
        }
    }

    /// Fails in `run` with the error selected by the `fail` route option.
    pub struct Failing;

    impl Controller for Failing {
        fn run(&mut self, ctx: &mut ControllerContext<'_>) -> Result<Response, DispatchError> {
            match ctx.option_str("fail").unwrap_or("system") {
                "user" => Err(ctx.user_error("name is required")),
                "not-found" => Err(DispatchError::not_found("widget 9")),
                "panic" => panic!("controller exploded"),
                "forced" => Err(DispatchError::force(
                    "maintenance",
                    CliResponse::new(3, "down for maintenance").into(),
                )),
                _ => Err(DispatchError::System(anyhow::anyhow!("database unreachable"))),
            }
        }
    }

    /// Prints while running; captures the output when `capture` is set.
    pub struct Chatty {
        pub capture: bool,
    }

    impl Controller for Chatty {
        fn captures_output(&self) -> bool {
            self.capture
        }

        fn run(&mut self, ctx: &mut ControllerContext<'_>) -> Result<Response, DispatchError> {
            ctx.println("working...");
            Ok(CliResponse::ok("done").into())
        }
    }
}

pub mod reporting {
    use brrtdispatch::dispatcher::{ErrorReporter, Phase};
    use brrtdispatch::error::DispatchError;
    use brrtdispatch::ids::DispatchId;
    use std::sync::{Arc, Mutex};

    /// Error reporter keeping `(phase, message)` of every report.
    #[derive(Clone, Default)]
    pub struct CountingReporter {
        pub reports: Arc<Mutex<Vec<(Phase, String)>>>,
    }

    impl CountingReporter {
        pub fn count(&self) -> usize {
            self.reports.lock().unwrap().len()
        }

        pub fn phases(&self) -> Vec<Phase> {
            self.reports.lock().unwrap().iter().map(|(p, _)| *p).collect()
        }
    }

    impl ErrorReporter for CountingReporter {
        fn report(
            &self,
            err: &DispatchError,
            phase: Phase,
            _dispatch_id: DispatchId,
            _route: Option<&str>,
        ) {
            self.reports.lock().unwrap().push((phase, err.to_string()));
        }
    }
}

pub mod transports {
    use brrtdispatch::response::{BufferedTransport, Transport};
    use std::io;

    /// Transport whose body writes fail for the first `failures` responses.
    #[derive(Default)]
    pub struct FailingTransport {
        pub failures: usize,
        pub inner: BufferedTransport,
    }

    impl FailingTransport {
        pub fn new(failures: usize) -> Self {
            Self {
                failures,
                inner: BufferedTransport::new(),
            }
        }
    }

    impl Transport for FailingTransport {
        fn send_head(&mut self, code: u16, headers: &[(String, String)]) -> io::Result<()> {
            self.inner.send_head(code, headers)
        }

        fn write_body(&mut self, chunk: &[u8]) -> io::Result<()> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"));
            }
            self.inner.write_body(chunk)
        }

        fn write_stray(&mut self, text: &str) -> io::Result<()> {
            self.inner.write_stray(text)
        }

        fn discard_buffered(&mut self) {
            self.inner.discard_buffered();
        }

        fn finish(&mut self) -> io::Result<()> {
            self.inner.finish()
        }

        fn emit_fallback(&mut self, message: &str) {
            self.inner.emit_fallback(message);
        }
    }
}

//! Request dispatch.
//!
//! Per-request state machine on a compiled listener: sequential pre-execute
//! plugin chain, command execution, cache update and response composition,
//! with at most one error-handler invocation per failed request.
//!
//! Auth and argument extraction run in the HTTP layer before dispatch so
//! out-of-band triggers (registry lookups) can pass precomputed arguments.

use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

use crate::exec::ExecCommandResult;
use crate::listener::args::Args;
use crate::listener::cache::StorageEntry;
use crate::listener::compile::CompiledListener;

/// Reserved key carrying the primary error message into the error handler's
/// argument mapping.
pub const KEY_ERROR: &str = "__gwError";

/// The outward response shape for one dispatched request.
#[derive(Debug, Serialize)]
pub struct ListenerResponse {
    /// Execution result, flattened into the top-level object on success.
    #[serde(flatten)]
    pub result: Option<ExecCommandResult>,

    /// Snapshot of the listener's cache entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageEntry>,

    /// Error message when the pre-execute chain or execution failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Outcome of the error-handler chain, when one is configured and fired.
    #[serde(rename = "errorHandlerResult", skip_serializing_if = "Option::is_none")]
    pub error_handler_result: Option<Box<ListenerResponse>>,
}

impl ListenerResponse {
    /// Whether this response maps to HTTP 200 (vs. 500).
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl CompiledListener {
    /// Dispatch one request with a final, already-extracted argument mapping.
    pub async fn handle_request(&self, args: Args) -> ListenerResponse {
        self.handle_request_depth(args, 0).await
    }

    /// Boxed at the recursion root: the error-handler chain re-enters the
    /// dispatcher one level deep, so the future type must be erased here for
    /// the compiler to prove it `Send`.
    pub(crate) fn handle_request_depth(
        &self,
        args: Args,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = ListenerResponse> + Send + '_>> {
        Box::pin(self.dispatch(args, depth))
    }

    async fn dispatch(&self, mut args: Args, depth: usize) -> ListenerResponse {
        // Pre-execute chain, in declared order. A hook error short-circuits
        // the chain and skips execution and the cache update.
        for plugin in self.plugins() {
            if let Some(hook) = plugin.pre_execute() {
                if let Err(err) = hook.hook_pre_execute(&mut args).await {
                    tracing::warn!(
                        listener = %self.route(),
                        plugin = plugin.name(),
                        error = %err,
                        "pre-execute hook failed"
                    );
                    let message = format!("pre-execute hook {} failed: {}", plugin.name(), err);
                    return self.compose_failure(args, message, depth).await;
                }
            }
        }

        match self.executor.execute(self.command(), &args).await {
            Ok(result) => {
                self.storage.store(
                    &self.storage_key,
                    StorageEntry::success(args.clone(), result.clone()),
                );
                tracing::debug!(
                    listener = %self.route(),
                    exit_code = result.exit_code,
                    "execution succeeded"
                );
                ListenerResponse {
                    result: Some(result),
                    storage: self.storage.get(&self.storage_key),
                    error: None,
                    error_handler_result: None,
                }
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(listener = %self.route(), error = %message, "execution failed");
                self.storage.store(
                    &self.storage_key,
                    StorageEntry::failure(args.clone(), message.clone()),
                );
                self.compose_failure(args, message, depth).await
            }
        }
    }

    /// Error hooks, then at most one error-handler invocation (depth 0 only).
    async fn compose_failure(
        &self,
        args: Args,
        message: String,
        depth: usize,
    ) -> ListenerResponse {
        for plugin in self.plugins() {
            if let Some(hook) = plugin.on_error() {
                if let Err(err) = hook.hook_error(&args, &message).await {
                    // Reported only; never masks the primary error.
                    tracing::warn!(
                        listener = %self.route(),
                        plugin = plugin.name(),
                        error = %err,
                        "error hook failed"
                    );
                }
            }
        }

        let error_handler_result = match (self.error_handler(), depth) {
            (Some(handler), 0) => {
                let mut handler_args = args;
                handler_args.insert(KEY_ERROR.to_string(), Value::String(message.clone()));
                Some(Box::new(
                    handler.handle_request_depth(handler_args, depth + 1).await,
                ))
            }
            _ => None,
        };

        ListenerResponse {
            result: None,
            storage: None,
            error: Some(message),
            error_handler_result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, OnceLock};

    use crate::config::CommandConfig;
    use crate::exec::{ExecError, Executor};
    use crate::listener::cache::StorageCache;
    use crate::plugins::{ErrorHook, Plugin, PluginError, PluginResult, PreExecuteHook};

    /// Executor recording every call; fails for configured command names.
    #[derive(Default)]
    struct MockExecutor {
        calls: Mutex<Vec<(String, Args)>>,
        fail: HashSet<String>,
    }

    impl MockExecutor {
        fn failing(commands: &[&str]) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: commands.iter().map(|c| c.to_string()).collect(),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn last_args(&self) -> Option<Args> {
            self.calls.lock().unwrap().last().map(|(_, a)| a.clone())
        }
    }

    #[async_trait]
    impl Executor for MockExecutor {
        async fn execute(
            &self,
            command: &CommandConfig,
            args: &Args,
        ) -> Result<ExecCommandResult, ExecError> {
            self.calls
                .lock()
                .unwrap()
                .push((command.command.clone(), args.clone()));
            if self.fail.contains(&command.command) {
                return Err(ExecError::Failed {
                    command: command.command.clone(),
                    exit_code: 1,
                    output: "boom".into(),
                });
            }
            Ok(ExecCommandResult {
                command: command.command.clone(),
                args: vec![],
                output: "ok".into(),
                exit_code: 0,
            })
        }
    }

    struct FailingPreExecute;

    impl Plugin for FailingPreExecute {
        fn name(&self) -> &'static str {
            "failing-pre-execute"
        }

        fn pre_execute(&self) -> Option<&dyn PreExecuteHook> {
            Some(self)
        }
    }

    #[async_trait]
    impl PreExecuteHook for FailingPreExecute {
        async fn hook_pre_execute(&self, _args: &mut Args) -> PluginResult<()> {
            Err(PluginError::new("rejected"))
        }
    }

    struct FailingErrorHook;

    impl Plugin for FailingErrorHook {
        fn name(&self) -> &'static str {
            "failing-error-hook"
        }

        fn on_error(&self) -> Option<&dyn ErrorHook> {
            Some(self)
        }
    }

    #[async_trait]
    impl ErrorHook for FailingErrorHook {
        async fn hook_error(&self, _args: &Args, _error: &str) -> PluginResult<()> {
            Err(PluginError::new("hook broke"))
        }
    }

    struct CountingPreExecute(AtomicUsize);

    impl Plugin for CountingPreExecute {
        fn name(&self) -> &'static str {
            "counting-pre-execute"
        }

        fn pre_execute(&self) -> Option<&dyn PreExecuteHook> {
            Some(self)
        }
    }

    #[async_trait]
    impl PreExecuteHook for CountingPreExecute {
        async fn hook_pre_execute(&self, args: &mut Args) -> PluginResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            args.insert("touched".into(), json!(true));
            Ok(())
        }
    }

    fn listener(
        command: &str,
        plugins: Vec<Arc<dyn Plugin>>,
        executor: Arc<MockExecutor>,
        error_handler: Option<Arc<CompiledListener>>,
        storage: StorageCache,
    ) -> CompiledListener {
        CompiledListener {
            route: format!("/test/{command}"),
            methods: vec!["GET".into()],
            auth: vec![],
            command: CommandConfig {
                command: command.into(),
                ..Default::default()
            },
            plugins,
            executor,
            storage,
            storage_key: format!("/test/{command}"),
            error_handler,
            id: OnceLock::new(),
        }
    }

    #[tokio::test]
    async fn success_response_carries_result_and_cache_snapshot() {
        let executor = Arc::new(MockExecutor::default());
        let storage = StorageCache::new();
        let listener = listener("echo", vec![], executor, None, storage.clone());

        let response = listener.handle_request(Args::new()).await;
        assert!(response.is_success());
        assert_eq!(response.result.as_ref().unwrap().output, "ok");
        assert!(response.storage.is_some());
        assert!(response.error_handler_result.is_none());
        assert!(storage.get("/test/echo").is_some());
    }

    #[tokio::test]
    async fn pre_execute_error_prevents_execution_and_cache_update() {
        let executor = Arc::new(MockExecutor::default());
        let storage = StorageCache::new();
        let listener = listener(
            "echo",
            vec![Arc::new(FailingPreExecute) as Arc<dyn Plugin>],
            executor.clone(),
            None,
            storage.clone(),
        );

        let response = listener.handle_request(Args::new()).await;
        assert!(!response.is_success());
        assert!(response.error.as_ref().unwrap().contains("rejected"));
        assert_eq!(executor.call_count(), 0);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn pre_execute_chain_runs_in_order_and_mutates_args() {
        let executor = Arc::new(MockExecutor::default());
        let counter = Arc::new(CountingPreExecute(AtomicUsize::new(0)));
        let listener = listener(
            "echo",
            vec![counter.clone() as Arc<dyn Plugin>],
            executor.clone(),
            None,
            StorageCache::new(),
        );

        listener.handle_request(Args::new()).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(executor.last_args().unwrap().get("touched"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn execution_failure_invokes_error_handler_with_error_key() {
        let executor = Arc::new(MockExecutor::failing(&["deploy"]));
        let storage = StorageCache::new();
        let handler = Arc::new(listener(
            "notify",
            vec![],
            executor.clone(),
            None,
            storage.clone(),
        ));
        let primary = listener(
            "deploy",
            vec![],
            executor.clone(),
            Some(handler),
            storage.clone(),
        );

        let mut args = Args::new();
        args.insert("name".into(), json!("release"));
        let response = primary.handle_request(args).await;

        assert!(!response.is_success());
        let nested = response.error_handler_result.as_ref().unwrap();
        assert!(nested.is_success());
        assert_eq!(nested.result.as_ref().unwrap().command, "notify");

        // The handler saw the original args plus the reserved error key.
        let handler_args = executor.last_args().unwrap();
        assert_eq!(handler_args.get("name"), Some(&json!("release")));
        assert!(handler_args.get(KEY_ERROR).unwrap().as_str().unwrap().contains("boom"));

        // Both executions recorded their outcome in the cache.
        assert!(storage.get("/test/deploy").unwrap().error.is_some());
        assert!(storage.get("/test/notify").unwrap().result.is_some());
    }

    #[tokio::test]
    async fn error_handler_chain_fires_at_most_once() {
        let executor = Arc::new(MockExecutor::failing(&["deploy", "notify"]));
        let handler = Arc::new(listener(
            "notify",
            vec![],
            executor.clone(),
            None,
            StorageCache::new(),
        ));
        let primary = listener(
            "deploy",
            vec![],
            executor.clone(),
            Some(handler),
            StorageCache::new(),
        );

        let response = primary.handle_request(Args::new()).await;
        let nested = response.error_handler_result.as_ref().unwrap();
        assert!(nested.error.is_some());
        assert!(nested.error_handler_result.is_none());
        assert_eq!(executor.call_count(), 2);
    }

    #[tokio::test]
    async fn failing_error_hook_never_masks_the_primary_error() {
        let executor = Arc::new(MockExecutor::failing(&["deploy"]));
        let storage = StorageCache::new();
        let handler = Arc::new(listener(
            "notify",
            vec![],
            executor.clone(),
            None,
            storage.clone(),
        ));
        let primary = listener(
            "deploy",
            vec![Arc::new(FailingErrorHook) as Arc<dyn Plugin>],
            executor.clone(),
            Some(handler),
            storage,
        );

        let response = primary.handle_request(Args::new()).await;

        // The hook failure is logged only; the primary error survives and
        // the error-handler chain still runs.
        assert!(response.error.as_ref().unwrap().contains("boom"));
        let nested = response.error_handler_result.as_ref().unwrap();
        assert!(nested.is_success());
        assert_eq!(executor.call_count(), 2);
    }

    #[tokio::test]
    async fn dispatch_runs_on_a_spawned_task() {
        let executor = Arc::new(MockExecutor::failing(&["deploy"]));
        let handler = Arc::new(listener(
            "notify",
            vec![],
            executor.clone(),
            None,
            StorageCache::new(),
        ));
        let primary = Arc::new(listener(
            "deploy",
            vec![],
            executor,
            Some(handler),
            StorageCache::new(),
        ));

        // Spawning requires the dispatch future to be Send, error-handler
        // recursion included.
        let response = tokio::spawn(async move { primary.handle_request(Args::new()).await })
            .await
            .unwrap();
        assert!(response.error_handler_result.is_some());
    }

    #[tokio::test]
    async fn no_error_handler_means_field_absent() {
        let executor = Arc::new(MockExecutor::failing(&["deploy"]));
        let primary = listener("deploy", vec![], executor, None, StorageCache::new());

        let response = primary.handle_request(Args::new()).await;
        assert!(response.error_handler_result.is_none());

        let body = serde_json::to_value(&response).unwrap();
        assert!(body.get("errorHandlerResult").is_none());
        assert!(body.get("error").is_some());
    }

    #[tokio::test]
    async fn success_json_flattens_execution_result() {
        let executor = Arc::new(MockExecutor::default());
        let listener = listener("echo", vec![], executor, None, StorageCache::new());

        let response = listener.handle_request(Args::new()).await;
        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["output"], json!("ok"));
        assert_eq!(body["exit_code"], json!(0));
        assert!(body.get("error").is_none());
        assert!(body["storage"].is_object());
    }
}

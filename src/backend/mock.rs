//! 测试用的脚本化后端

use super::hub::EventHub;
use super::{Backend, BackendCommand, BackendError, DiffResult, EventStream, Package};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

pub struct MockBackend {
    pub hub: EventHub,
    packages: Mutex<HashMap<String, Result<Vec<Package>, String>>>,
    diffs: Mutex<Result<Vec<DiffResult>, String>>,
    install_failures: Mutex<HashMap<String, String>>,
    status_failure: Mutex<Option<String>>,
    calls: Mutex<Vec<BackendCommand>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            hub: EventHub::new(),
            packages: Mutex::new(HashMap::new()),
            diffs: Mutex::new(Ok(Vec::new())),
            install_failures: Mutex::new(HashMap::new()),
            status_failure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_packages(&self, manager: &str, packages: Vec<Package>) {
        self.packages
            .lock()
            .unwrap()
            .insert(manager.to_string(), Ok(packages));
    }

    pub fn fail_packages(&self, manager: &str, message: &str) {
        self.packages
            .lock()
            .unwrap()
            .insert(manager.to_string(), Err(message.to_string()));
    }

    pub fn set_diffs(&self, diffs: Vec<DiffResult>) {
        *self.diffs.lock().unwrap() = Ok(diffs);
    }

    pub fn fail_diffs(&self, message: &str) {
        *self.diffs.lock().unwrap() = Err(message.to_string());
    }

    pub fn fail_install(&self, manager: &str, message: &str) {
        self.install_failures
            .lock()
            .unwrap()
            .insert(manager.to_string(), message.to_string());
    }

    pub fn clear_install_failure(&self, manager: &str) {
        self.install_failures.lock().unwrap().remove(manager);
    }

    pub fn fail_status(&self, message: &str) {
        *self.status_failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<BackendCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.name() == name)
            .count()
    }

    pub fn emit(&self, event: &str, payload: Value) -> usize {
        self.hub.emit(event, payload)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn call(&self, command: BackendCommand) -> Result<Value, BackendError> {
        self.calls.lock().unwrap().push(command.clone());
        // 让出一次调度，模拟真实的挂起点
        tokio::task::yield_now().await;

        match &command {
            BackendCommand::GetManagersStatus => {
                if let Some(message) = self.status_failure.lock().unwrap().clone() {
                    return Err(BackendError::failed(&command, message));
                }
                let packages = self.packages.lock().unwrap();
                let mut names: Vec<&String> = packages.keys().collect();
                names.sort();
                let status: Vec<Value> = names
                    .into_iter()
                    .map(|name| {
                        let list = packages[name].as_ref().map(Vec::as_slice).unwrap_or(&[]);
                        json!({
                            "name": name,
                            "total": list.len(),
                            "installed": list.iter().filter(|p| p.installed).count(),
                            "updates_available": 0,
                        })
                    })
                    .collect();
                Ok(Value::Array(status))
            }
            BackendCommand::GetPackages { manager } => {
                match self.packages.lock().unwrap().get(manager) {
                    Some(Ok(list)) => Ok(json!(list)),
                    Some(Err(message)) => Err(BackendError::failed(&command, message.clone())),
                    None => Err(BackendError::failed(
                        &command,
                        format!("Package file not found for manager: {}", manager),
                    )),
                }
            }
            BackendCommand::GetDiff => match &*self.diffs.lock().unwrap() {
                Ok(diffs) => Ok(json!(diffs)),
                Err(message) => Err(BackendError::failed(&command, message.clone())),
            },
            BackendCommand::InstallPackages { manager } => {
                let failure = self.install_failures.lock().unwrap().get(manager).cloned();
                match failure {
                    Some(message) => Err(BackendError::failed(&command, message)),
                    None => Ok(Value::Null),
                }
            }
        }
    }

    fn subscribe(&self, event: &str) -> EventStream {
        self.hub.subscribe(event)
    }
}

pub fn package(name: &str, manager: &str, installed: bool) -> Package {
    Package {
        name: name.to_string(),
        manager: manager.to_string(),
        installed,
        version: None,
        is_local: false,
    }
}

pub fn diff(name: &str, install: &[&str], remove: &[&str]) -> DiffResult {
    DiffResult {
        name: name.to_string(),
        display_name: name.to_string(),
        to_install: install.iter().map(|s| s.to_string()).collect(),
        to_remove: remove.iter().map(|s| s.to_string()).collect(),
    }
}

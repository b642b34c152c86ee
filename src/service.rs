//  Copyright 2020 The monitor-power authors.
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
//! # service
//!
//! Installation and control of monitor-power as a system service.
use crate::config::{format_duration, Options};
use crate::errors::ServiceError;
use colored::Colorize;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

#[cfg(test)]
use mockall::automock;

pub const SERVICE_NAME: &str = "monitor-power";
pub const SERVICE_DESCRIPTION: &str = "Monitor power usage";
pub const SYSTEMD_UNIT_DIR: &str = "/etc/systemd/system";

/// Actions available on the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install,
    Start,
    Stop,
    Status,
    Remove,
}

/// Something able to manage the daemon as a system service.
///
/// Every action returns a human readable status line.
#[cfg_attr(test, automock)]
pub trait ServiceManager {
    /// Installs the service, the daemon being started with `args`.
    fn install(&self, args: &[String]) -> Result<String, ServiceError>;
    fn start(&self) -> Result<String, ServiceError>;
    fn stop(&self) -> Result<String, ServiceError>;
    fn status(&self) -> Result<String, ServiceError>;
    fn remove(&self) -> Result<String, ServiceError>;
}

/// Arguments the installed daemon is started with, so that it runs with the
/// same options as the installing command.
pub fn install_args(opts: &Options) -> Vec<String> {
    vec![
        String::from("--collect"),
        format_duration(opts.collect_interval),
        String::from("--reduce-interval"),
        format_duration(opts.reduce_interval),
        String::from("--http"),
        opts.http.clone(),
        String::from("--os"),
        opts.os.clone(),
    ]
}

/// Runs `action` on `manager`.
pub fn run_action<M: ServiceManager>(
    manager: &M,
    action: Action,
    opts: &Options,
) -> Result<String, ServiceError> {
    debug!("Running service action {:?}", action);
    match action {
        Action::Install => manager.install(&install_args(opts)),
        Action::Start => manager.start(),
        Action::Stop => manager.stop(),
        Action::Status => manager.status(),
        Action::Remove => manager.remove(),
    }
}

/// What a `systemctl` invocation answered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Thin layer over the `systemctl` command.
#[cfg_attr(test, automock)]
pub trait Systemctl {
    /// Runs `systemctl <command> <unit>`.
    fn run(&self, command: &str, unit: &str) -> Result<CommandOutput, ServiceError>;
    /// Runs `systemctl daemon-reload`.
    fn daemon_reload(&self) -> Result<(), ServiceError>;
}

/// The real `systemctl` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemctlCommand;

impl SystemctlCommand {
    fn output(args: &[&str]) -> Result<CommandOutput, ServiceError> {
        trace!("systemctl {}", args.join(" "));
        let output = Command::new("systemctl").args(args).output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl Systemctl for SystemctlCommand {
    fn run(&self, command: &str, unit: &str) -> Result<CommandOutput, ServiceError> {
        SystemctlCommand::output(&[command, unit])
    }

    fn daemon_reload(&self) -> Result<(), ServiceError> {
        let output = SystemctlCommand::output(&["daemon-reload"])?;
        if !output.success {
            return Err(ServiceError::Systemctl {
                command: String::from("daemon-reload"),
                stderr: output.stderr,
            });
        }
        Ok(())
    }
}

/// Service managed through a systemd unit.
#[derive(Debug)]
pub struct Systemd<C = SystemctlCommand> {
    name: String,
    description: String,
    unit_dir: PathBuf,
    executable: PathBuf,
    systemctl: C,
}

impl Systemd<SystemctlCommand> {
    /// Service named `name`, running the current executable.
    pub fn new(name: &str, description: &str) -> Result<Systemd<SystemctlCommand>, ServiceError> {
        Ok(Systemd::with_systemctl(
            name,
            description,
            SYSTEMD_UNIT_DIR,
            std::env::current_exe()?,
            SystemctlCommand,
        ))
    }
}

impl<C: Systemctl> Systemd<C> {
    pub fn with_systemctl(
        name: &str,
        description: &str,
        unit_dir: impl Into<PathBuf>,
        executable: impl Into<PathBuf>,
        systemctl: C,
    ) -> Systemd<C> {
        Systemd {
            name: String::from(name),
            description: String::from(description),
            unit_dir: unit_dir.into(),
            executable: executable.into(),
            systemctl,
        }
    }

    fn unit_name(&self) -> String {
        format!("{}.service", self.name)
    }

    pub fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(self.unit_name())
    }

    pub fn is_installed(&self) -> bool {
        self.unit_path().exists()
    }

    /// Renders the unit file starting the daemon with `args`.
    pub fn unit_file(&self, args: &[String]) -> String {
        let mut exec_start = quote(&self.executable.to_string_lossy());
        for arg in args {
            exec_start.push(' ');
            exec_start.push_str(&quote(arg));
        }
        format!(
            "[Unit]\n\
             Description={description}\n\
             After=network.target\n\
             \n\
             [Service]\n\
             PIDFile=/var/run/{name}.pid\n\
             ExecStartPre=/bin/rm -f /var/run/{name}.pid\n\
             ExecStart={exec_start}\n\
             Restart=on-failure\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            description = self.description,
            name = self.name,
        )
    }

    fn systemctl(&self, command: &str) -> Result<CommandOutput, ServiceError> {
        let output = self.systemctl.run(command, &self.unit_name())?;
        if !output.success {
            return Err(ServiceError::Systemctl {
                command: format!("{} {}", command, self.unit_name()),
                stderr: String::from(output.stderr.trim()),
            });
        }
        Ok(output)
    }

    fn ensure_installed(&self) -> Result<(), ServiceError> {
        if !self.is_installed() {
            return Err(ServiceError::NotInstalled(self.name.clone()));
        }
        Ok(())
    }

    /// Pid of the running service, `Some(None)` when running without a
    /// known pid, `None` when stopped.
    fn running_pid(&self) -> Result<Option<Option<u32>>, ServiceError> {
        // `systemctl status` exits non zero on a stopped unit, only its output matters
        let output = self.systemctl.run("status", &self.unit_name())?;
        Ok(parse_running_pid(&output.stdout))
    }

    fn done(&self, what: &str) -> String {
        format!("{} {}:\t\t\t\t\t[  {}  ]", what, self.description, "OK".green())
    }
}

/// Extracts the running state out of `systemctl status` output.
fn parse_running_pid(status: &str) -> Option<Option<u32>> {
    let re_active = Regex::new(r"Active:\s+active").ok()?;
    if !re_active.is_match(status) {
        return None;
    }
    let pid = Regex::new(r"Main PID:\s+(\d+)")
        .ok()
        .and_then(|re| re.captures(status))
        .and_then(|captures| captures[1].parse().ok());
    Some(pid)
}

fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.contains(char::is_whitespace) || arg.contains('"') {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        String::from(arg)
    }
}

impl<C: Systemctl> ServiceManager for Systemd<C> {
    fn install(&self, args: &[String]) -> Result<String, ServiceError> {
        let path = self.unit_path();
        if self.is_installed() {
            return Err(ServiceError::AlreadyInstalled(self.name.clone()));
        }
        write_unit(&path, &self.unit_file(args))?;
        info!("Wrote unit file {}", path.display());
        self.systemctl.daemon_reload()?;
        self.systemctl("enable")?;
        Ok(self.done("Install"))
    }

    fn start(&self) -> Result<String, ServiceError> {
        self.ensure_installed()?;
        if self.running_pid()?.is_some() {
            return Err(ServiceError::AlreadyRunning(self.name.clone()));
        }
        self.systemctl("start")?;
        Ok(self.done("Starting"))
    }

    fn stop(&self) -> Result<String, ServiceError> {
        self.ensure_installed()?;
        if self.running_pid()?.is_none() {
            return Err(ServiceError::NotRunning(self.name.clone()));
        }
        self.systemctl("stop")?;
        Ok(self.done("Stopping"))
    }

    fn status(&self) -> Result<String, ServiceError> {
        self.ensure_installed()?;
        Ok(match self.running_pid()? {
            Some(Some(pid)) => format!("Service (pid {pid}) is running..."),
            Some(None) => String::from("Service is running..."),
            None => String::from("Service is stopped"),
        })
    }

    fn remove(&self) -> Result<String, ServiceError> {
        self.ensure_installed()?;
        self.systemctl("disable")?;
        fs::remove_file(self.unit_path())?;
        self.systemctl.daemon_reload()?;
        Ok(self.done("Removing"))
    }
}

fn write_unit(path: &Path, content: &str) -> Result<(), ServiceError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RUNNING: &str = "\u{25cf} monitor-power.service - Monitor power usage\n   \
        Loaded: loaded (/etc/systemd/system/monitor-power.service; enabled)\n   \
        Active: active (running) since Tue 2024-01-02 10:00:00 UTC; 1h ago\n \
        Main PID: 4242 (monitor-power)\n";
    const STOPPED: &str = "\u{25cf} monitor-power.service - Monitor power usage\n   \
        Loaded: loaded (/etc/systemd/system/monitor-power.service; enabled)\n   \
        Active: inactive (dead)\n";

    fn output(success: bool, stdout: &str) -> CommandOutput {
        CommandOutput {
            success,
            stdout: String::from(stdout),
            stderr: String::new(),
        }
    }

    fn systemd(dir: &TempDir, systemctl: MockSystemctl) -> Systemd<MockSystemctl> {
        Systemd::with_systemctl(
            SERVICE_NAME,
            SERVICE_DESCRIPTION,
            dir.path(),
            "/usr/local/bin/monitor-power",
            systemctl,
        )
    }

    fn install_unit(service: &Systemd<MockSystemctl>) {
        fs::write(service.unit_path(), service.unit_file(&[])).unwrap();
    }

    #[test]
    fn unit_file_starts_the_daemon_with_args() {
        let dir = tempfile::tempdir().unwrap();
        let service = systemd(&dir, MockSystemctl::new());
        let unit = service.unit_file(&install_args(&Options::default()));

        assert!(unit.contains("Description=Monitor power usage\n"));
        assert!(unit.contains(
            "ExecStart=/usr/local/bin/monitor-power --collect 1s --reduce-interval 1s --http :9096 --os fedora\n"
        ));
        assert!(unit.contains("PIDFile=/var/run/monitor-power.pid\n"));
        assert!(unit.ends_with("WantedBy=multi-user.target\n"));
    }

    #[test]
    fn args_with_spaces_are_quoted() {
        assert_eq!(quote(":9096"), ":9096");
        assert_eq!(quote("my os"), "\"my os\"");
        assert_eq!(quote(""), "\"\"");
    }

    #[test]
    fn install_writes_unit_and_enables_it() {
        let dir = tempfile::tempdir().unwrap();
        let mut systemctl = MockSystemctl::new();
        systemctl.expect_daemon_reload().times(1).returning(|| Ok(()));
        systemctl
            .expect_run()
            .withf(|command, unit| command == "enable" && unit == "monitor-power.service")
            .times(1)
            .returning(|_, _| Ok(output(true, "")));
        let service = systemd(&dir, systemctl);

        let status = service.install(&[String::from("--os"), String::from("fedora")]).unwrap();

        assert!(status.starts_with("Install Monitor power usage:"));
        let unit = fs::read_to_string(dir.path().join("monitor-power.service")).unwrap();
        assert!(unit.contains("ExecStart=/usr/local/bin/monitor-power --os fedora\n"));
    }

    #[test]
    fn installing_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let service = systemd(&dir, MockSystemctl::new());
        install_unit(&service);
        assert!(matches!(
            service.install(&[]),
            Err(ServiceError::AlreadyInstalled(name)) if name == SERVICE_NAME
        ));
    }

    #[test]
    fn removing_a_missing_service_fails() {
        let dir = tempfile::tempdir().unwrap();
        let service = systemd(&dir, MockSystemctl::new());
        assert!(matches!(service.remove(), Err(ServiceError::NotInstalled(_))));
        assert!(matches!(service.start(), Err(ServiceError::NotInstalled(_))));
        assert!(matches!(service.status(), Err(ServiceError::NotInstalled(_))));
    }

    #[test]
    fn remove_disables_and_deletes_the_unit() {
        let dir = tempfile::tempdir().unwrap();
        let mut systemctl = MockSystemctl::new();
        systemctl
            .expect_run()
            .withf(|command, _| command == "disable")
            .times(1)
            .returning(|_, _| Ok(output(true, "")));
        systemctl.expect_daemon_reload().times(1).returning(|| Ok(()));
        let service = systemd(&dir, systemctl);
        install_unit(&service);

        assert!(service.remove().unwrap().starts_with("Removing"));
        assert!(!service.is_installed());
    }

    #[test]
    fn status_reports_the_pid() {
        let dir = tempfile::tempdir().unwrap();
        let mut systemctl = MockSystemctl::new();
        systemctl
            .expect_run()
            .withf(|command, _| command == "status")
            .times(1)
            .returning(|_, _| Ok(output(true, RUNNING)));
        let service = systemd(&dir, systemctl);
        install_unit(&service);

        assert_eq!(service.status().unwrap(), "Service (pid 4242) is running...");
    }

    #[test]
    fn stopped_service_cannot_be_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let mut systemctl = MockSystemctl::new();
        systemctl
            .expect_run()
            .withf(|command, _| command == "status")
            .returning(|_, _| Ok(output(false, STOPPED)));
        let service = systemd(&dir, systemctl);
        install_unit(&service);

        assert_eq!(service.status().unwrap(), "Service is stopped");
        assert!(matches!(service.stop(), Err(ServiceError::NotRunning(_))));
    }

    #[test]
    fn failing_systemctl_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut systemctl = MockSystemctl::new();
        systemctl
            .expect_run()
            .withf(|command, _| command == "status")
            .returning(|_, _| Ok(output(false, STOPPED)));
        systemctl
            .expect_run()
            .withf(|command, _| command == "start")
            .returning(|_, _| {
                Ok(CommandOutput {
                    success: false,
                    stdout: String::new(),
                    stderr: String::from("Access denied\n"),
                })
            });
        let service = systemd(&dir, systemctl);
        install_unit(&service);

        match service.start() {
            Err(ServiceError::Systemctl { command, stderr }) => {
                assert_eq!(command, "start monitor-power.service");
                assert_eq!(stderr, "Access denied");
            }
            other => panic!("expected a systemctl failure, got {other:?}"),
        }
    }

    #[test]
    fn parse_status_output() {
        assert_eq!(parse_running_pid(RUNNING), Some(Some(4242)));
        assert_eq!(parse_running_pid("Active: active (running)\n"), Some(None));
        assert_eq!(parse_running_pid(STOPPED), None);
    }

    #[test]
    fn actions_dispatch_to_the_manager() {
        let opts = Options::default();
        let mut manager = MockServiceManager::new();
        manager
            .expect_install()
            .withf(|args| args.len() == 8 && args[0] == "--collect" && args[7] == "fedora")
            .times(1)
            .returning(|_| Ok(String::from("installed")));
        manager
            .expect_status()
            .times(1)
            .returning(|| Ok(String::from("Service is stopped")));

        assert_eq!(run_action(&manager, Action::Install, &opts).unwrap(), "installed");
        assert_eq!(run_action(&manager, Action::Status, &opts).unwrap(), "Service is stopped");
    }
}

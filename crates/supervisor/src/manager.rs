// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The manager: single authority for job mutation.
//!
//! Architecture mirrors the daemon's engine loop: a clonable
//! [`ManagerHandle`] queues commands onto an mpsc channel, and `run()`
//! applies them in arrival order while also reaping exit notices from
//! the per-child wait tasks. All state mutation happens on that one
//! logical writer; collaborators observe through the event emitter.

use crate::error::SupervisorError;
use crate::job::{FlapGuard, Job, JobSnapshot, JobState};
use crate::process::{ExitNotice, ProcessId};
use gaffer_core::{Event, EventEmitter, JobName, JobSpec, SubscriptionId};
use indexmap::IndexMap;
use nix::sys::signal::Signal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

/// Delay before retrying a failed spawn (the flapping guard still
/// applies on top of this).
const SPAWN_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Manager tunables, filled in from the `[gaffer]` config section.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub flap: FlapGuard,
    /// Grace period between SIGTERM and SIGKILL in the two-phase
    /// terminate.
    pub stop_grace: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            flap: FlapGuard::default(),
            stop_grace: Duration::from_secs(10),
        }
    }
}

/// External collaborator attached to the manager before `run()`:
/// the signal handler and the socket listener.
pub trait Controller: Send {
    fn attach(&mut self, handle: ManagerHandle);
}

type Reply<T> = oneshot::Sender<Result<T, SupervisorError>>;

enum Command {
    AddJob {
        name: JobName,
        spec: JobSpec,
        reply: Reply<()>,
    },
    RemoveJob {
        name: String,
        reply: Reply<()>,
    },
    UpdateNumprocesses {
        name: String,
        numprocesses: u32,
        reply: Reply<()>,
    },
    StartJob {
        name: String,
        reply: Reply<()>,
    },
    StopJob {
        name: String,
        reply: Reply<()>,
    },
    ListJobs {
        group: Option<String>,
        reply: oneshot::Sender<Vec<JobSnapshot>>,
    },
    GetJob {
        name: String,
        reply: Reply<JobSnapshot>,
    },
    /// SIGKILL whatever survived the grace period.
    ForceKill {
        name: JobName,
        processes: Vec<ProcessId>,
    },
    /// The flapping pause for a job elapsed.
    FlapResume {
        name: JobName,
    },
    /// Close the gap after a deferred spawn retry.
    Reconcile {
        name: JobName,
    },
    Shutdown {
        reply: Option<oneshot::Sender<()>>,
    },
}

/// Clonable front door to the manager loop. Mutations are queued and
/// applied in arrival order by the single writer.
#[derive(Clone)]
pub struct ManagerHandle {
    tx: mpsc::UnboundedSender<Command>,
    emitter: Arc<EventEmitter<Event>>,
}

impl ManagerHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, SupervisorError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .map_err(|_| SupervisorError::ManagerClosed)?;
        rx.await.map_err(|_| SupervisorError::ManagerClosed)?
    }

    /// Add a job under its full name (`group.name`, or a bare name in
    /// the default group). Spawns immediately when the spec says so.
    pub async fn add_job(&self, name: &str, spec: JobSpec) -> Result<(), SupervisorError> {
        let name = JobName::parse(name)?;
        self.request(|reply| Command::AddJob { name, spec, reply })
            .await
    }

    /// Stop, drain, and drop a job.
    pub async fn remove_job(&self, name: &str) -> Result<(), SupervisorError> {
        let name = name.to_string();
        self.request(|reply| Command::RemoveJob { name, reply })
            .await
    }

    /// Change the desired process count. Returns once reconciliation is
    /// issued; subscribe to events to observe completion.
    pub async fn update_numprocesses(
        &self,
        name: &str,
        numprocesses: u32,
    ) -> Result<(), SupervisorError> {
        let name = name.to_string();
        self.request(|reply| Command::UpdateNumprocesses {
            name,
            numprocesses,
            reply,
        })
        .await
    }

    pub async fn start_job(&self, name: &str) -> Result<(), SupervisorError> {
        let name = name.to_string();
        self.request(|reply| Command::StartJob { name, reply }).await
    }

    pub async fn stop_job(&self, name: &str) -> Result<(), SupervisorError> {
        let name = name.to_string();
        self.request(|reply| Command::StopJob { name, reply }).await
    }

    /// Snapshot every job, optionally restricted to one group.
    pub async fn list_jobs(
        &self,
        group: Option<&str>,
    ) -> Result<Vec<JobSnapshot>, SupervisorError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::ListJobs {
                group: group.map(str::to_string),
                reply: tx,
            })
            .map_err(|_| SupervisorError::ManagerClosed)?;
        rx.await.map_err(|_| SupervisorError::ManagerClosed)
    }

    pub async fn get_job(&self, name: &str) -> Result<JobSnapshot, SupervisorError> {
        let name = name.to_string();
        self.request(|reply| Command::GetJob { name, reply }).await
    }

    /// Request shutdown and wait for the manager to finish draining.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .tx
            .send(Command::Shutdown { reply: Some(tx) })
            .is_err()
        {
            return;
        }
        let _ = rx.await;
    }

    /// Fire-and-forget shutdown, for signal handlers.
    pub fn request_shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown { reply: None });
    }

    pub fn subscribe<F>(&self, topic: &str, listener: F) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), gaffer_core::BoxError> + Send + Sync + 'static,
    {
        self.emitter.subscribe(topic, listener)
    }

    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) {
        self.emitter.unsubscribe(topic, id);
    }
}

/// The supervisor state machine. Construct in `main`, attach
/// controllers, seed jobs, then `run()` until shutdown.
pub struct Manager {
    config: ManagerConfig,
    jobs: IndexMap<JobName, Job>,
    emitter: Arc<EventEmitter<Event>>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    notice_tx: mpsc::UnboundedSender<ExitNotice>,
    notice_rx: mpsc::UnboundedReceiver<ExitNotice>,
    controllers: Vec<Box<dyn Controller>>,
    started: bool,
}

impl Manager {
    pub fn new(config: ManagerConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        Self {
            config,
            jobs: IndexMap::new(),
            emitter: Arc::new(EventEmitter::new()),
            cmd_tx,
            cmd_rx,
            notice_tx,
            notice_rx,
            controllers: Vec::new(),
            started: false,
        }
    }

    pub fn handle(&self) -> ManagerHandle {
        ManagerHandle {
            tx: self.cmd_tx.clone(),
            emitter: Arc::clone(&self.emitter),
        }
    }

    pub fn subscribe<F>(&self, topic: &str, listener: F) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), gaffer_core::BoxError> + Send + Sync + 'static,
    {
        self.emitter.subscribe(topic, listener)
    }

    /// Attach controllers before `run()`. A second call is a no-op.
    pub fn start(&mut self, controllers: Vec<Box<dyn Controller>>) {
        if self.started {
            tracing::debug!("manager already started");
            return;
        }
        self.started = true;
        let handle = self.handle();
        for mut controller in controllers {
            controller.attach(handle.clone());
            self.controllers.push(controller);
        }
    }

    /// Add a job directly. Used to seed declared jobs before `run()`;
    /// runtime callers go through the handle.
    pub fn add_job(&mut self, name: JobName, spec: JobSpec) -> Result<(), SupervisorError> {
        if self.jobs.contains_key(&name) {
            return Err(SupervisorError::JobExists(name));
        }
        let job = Job::new(name.clone(), spec);
        self.jobs.insert(name.clone(), job);
        let Self {
            jobs,
            emitter,
            notice_tx,
            cmd_tx,
            config,
            ..
        } = self;
        if let Some(job) = jobs.get_mut(&name) {
            if job.starts_immediately() {
                job.set_state(JobState::Running);
                emitter.publish(&Event::Start { job: name });
                reconcile_up(job, emitter, notice_tx, cmd_tx, &config.flap);
            }
        }
        Ok(())
    }

    fn remove_job(&mut self, name: &str) -> Result<(), SupervisorError> {
        let key = JobName::parse(name)?;
        let Self {
            jobs,
            emitter,
            cmd_tx,
            config,
            ..
        } = self;
        let Some(job) = jobs.get_mut(&key) else {
            return Err(SupervisorError::JobNotFound(name.to_string()));
        };
        job.set_removing();
        emitter.publish(&Event::Stop { job: key.clone() });
        job.stop_all(Signal::SIGTERM);
        schedule(
            cmd_tx,
            config.stop_grace,
            Command::ForceKill {
                name: key.clone(),
                processes: job.live_ids(),
            },
        );
        if job.is_drained() {
            jobs.shift_remove(&key);
        }
        Ok(())
    }

    fn start_job(&mut self, name: &str) -> Result<(), SupervisorError> {
        let key = JobName::parse(name)?;
        let Self {
            jobs,
            emitter,
            notice_tx,
            cmd_tx,
            config,
            ..
        } = self;
        let Some(job) = jobs.get_mut(&key) else {
            return Err(SupervisorError::JobNotFound(name.to_string()));
        };
        if job.state() == JobState::Running {
            return Ok(());
        }
        job.set_state(JobState::Running);
        emitter.publish(&Event::Start { job: key });
        reconcile_up(job, emitter, notice_tx, cmd_tx, &config.flap);
        Ok(())
    }

    fn stop_job(&mut self, name: &str) -> Result<(), SupervisorError> {
        let key = JobName::parse(name)?;
        let Self {
            jobs,
            emitter,
            cmd_tx,
            config,
            ..
        } = self;
        let Some(job) = jobs.get_mut(&key) else {
            return Err(SupervisorError::JobNotFound(name.to_string()));
        };
        if job.state() != JobState::Stopped {
            job.set_state(JobState::Stopped);
            emitter.publish(&Event::Stop { job: key.clone() });
        }
        job.stop_all(Signal::SIGTERM);
        schedule(
            cmd_tx,
            config.stop_grace,
            Command::ForceKill {
                name: key,
                processes: job.live_ids(),
            },
        );
        Ok(())
    }

    fn update_numprocesses(
        &mut self,
        name: &str,
        numprocesses: u32,
    ) -> Result<(), SupervisorError> {
        let key = JobName::parse(name)?;
        let Self {
            jobs,
            emitter,
            notice_tx,
            cmd_tx,
            config,
            ..
        } = self;
        let Some(job) = jobs.get_mut(&key) else {
            return Err(SupervisorError::JobNotFound(name.to_string()));
        };
        job.set_numprocesses(numprocesses);
        emitter.publish(&Event::Update {
            job: key.clone(),
            numprocesses,
        });
        if job.state() != JobState::Running {
            return Ok(());
        }
        if job.needs_more() {
            reconcile_up(job, emitter, notice_tx, cmd_tx, &config.flap);
        } else if job.has_surplus() {
            let surplus = job.live_len() - numprocesses as usize;
            let victims = job.newest(surplus);
            job.signal_processes(&victims, Signal::SIGTERM);
            schedule(
                cmd_tx,
                config.stop_grace,
                Command::ForceKill {
                    name: key,
                    processes: victims,
                },
            );
        }
        Ok(())
    }

    fn list_jobs(&self, group: Option<&str>) -> Vec<JobSnapshot> {
        let now = Instant::now();
        self.jobs
            .values()
            .filter(|job| group.map_or(true, |g| job.name().group() == g))
            .map(|job| job.snapshot(now))
            .collect()
    }

    fn get_job(&self, name: &str) -> Result<JobSnapshot, SupervisorError> {
        let key = JobName::parse(name)?;
        self.jobs
            .get(&key)
            .map(|job| job.snapshot(Instant::now()))
            .ok_or_else(|| SupervisorError::JobNotFound(name.to_string()))
    }

    /// Apply one command. Returns the shutdown reply channel when the
    /// command asked the loop to stop.
    fn handle_command(&mut self, cmd: Command) -> Option<Option<oneshot::Sender<()>>> {
        match cmd {
            Command::AddJob { name, spec, reply } => {
                let _ = reply.send(self.add_job(name, spec));
            }
            Command::RemoveJob { name, reply } => {
                let _ = reply.send(self.remove_job(&name));
            }
            Command::UpdateNumprocesses {
                name,
                numprocesses,
                reply,
            } => {
                let _ = reply.send(self.update_numprocesses(&name, numprocesses));
            }
            Command::StartJob { name, reply } => {
                let _ = reply.send(self.start_job(&name));
            }
            Command::StopJob { name, reply } => {
                let _ = reply.send(self.stop_job(&name));
            }
            Command::ListJobs { group, reply } => {
                let _ = reply.send(self.list_jobs(group.as_deref()));
            }
            Command::GetJob { name, reply } => {
                let _ = reply.send(self.get_job(&name));
            }
            Command::ForceKill { name, processes } => {
                if let Some(job) = self.jobs.get(&name) {
                    job.signal_processes(&processes, Signal::SIGKILL);
                }
            }
            Command::FlapResume { name } => {
                let Self {
                    jobs,
                    emitter,
                    notice_tx,
                    cmd_tx,
                    config,
                    ..
                } = self;
                if let Some(job) = jobs.get_mut(&name) {
                    job.resume();
                    if job.state() == JobState::Running {
                        reconcile_up(job, emitter, notice_tx, cmd_tx, &config.flap);
                    }
                }
            }
            Command::Reconcile { name } => {
                let Self {
                    jobs,
                    emitter,
                    notice_tx,
                    cmd_tx,
                    config,
                    ..
                } = self;
                if let Some(job) = jobs.get_mut(&name) {
                    if job.state() == JobState::Running && !job.is_paused(Instant::now()) {
                        reconcile_up(job, emitter, notice_tx, cmd_tx, &config.flap);
                    }
                }
            }
            Command::Shutdown { reply } => return Some(reply),
        }
        None
    }

    /// Apply one exit notice. Returns true when the failure is fatal
    /// and the manager must shut down.
    fn handle_exit(&mut self, notice: ExitNotice) -> bool {
        let Self {
            jobs,
            emitter,
            notice_tx,
            cmd_tx,
            config,
            ..
        } = self;
        let fatal = notice.wait_failed;
        let Some(job) = jobs.get_mut(&notice.job) else {
            return fatal;
        };
        if job.reap(notice.process).is_none() {
            return fatal;
        }
        emitter.publish(&Event::Exit {
            job: notice.job.clone(),
            pid: notice.pid,
            status: notice.status,
        });
        if job.is_removing() {
            if job.is_drained() {
                jobs.shift_remove(&notice.job);
            }
            return fatal;
        }
        if fatal || job.state() != JobState::Running || !job.needs_more() {
            return fatal;
        }
        let now = Instant::now();
        if job.is_paused(now) {
            return false;
        }
        if job.record_restart(&config.flap, now) {
            emitter.publish(&Event::Flapping {
                job: notice.job.clone(),
            });
            schedule(
                cmd_tx,
                config.flap.window,
                Command::FlapResume { name: notice.job },
            );
            return false;
        }
        reconcile_up(job, emitter, notice_tx, cmd_tx, &config.flap);
        false
    }

    /// The reap loop. Applies queued commands and exit notices until
    /// shutdown, then drains every job and publishes `shutdown`.
    pub async fn run(mut self) {
        enum Turn {
            Cmd(Option<Command>),
            Exit(ExitNotice),
        }

        let mut shutdown_replies = Vec::new();
        loop {
            let turn = tokio::select! {
                cmd = self.cmd_rx.recv() => Turn::Cmd(cmd),
                Some(notice) = self.notice_rx.recv() => Turn::Exit(notice),
            };
            match turn {
                Turn::Cmd(Some(cmd)) => {
                    if let Some(reply) = self.handle_command(cmd) {
                        if let Some(reply) = reply {
                            shutdown_replies.push(reply);
                        }
                        break;
                    }
                }
                // every handle dropped: nothing can mutate us anymore
                Turn::Cmd(None) => break,
                Turn::Exit(notice) => {
                    if self.handle_exit(notice) {
                        tracing::error!("reap failure, shutting down");
                        break;
                    }
                }
            }
        }
        self.drain().await;
        for reply in shutdown_replies {
            let _ = reply.send(());
        }
    }

    /// Two-phase terminate of everything still live, reaping as exits
    /// come in: SIGTERM, wait out the grace period, SIGKILL survivors.
    async fn drain(&mut self) {
        for (name, job) in self.jobs.iter_mut() {
            if job.state() == JobState::Running {
                self.emitter.publish(&Event::Stop { job: name.clone() });
            }
            job.set_state(JobState::Stopped);
            job.stop_all(Signal::SIGTERM);
        }

        self.drain_until(self.config.stop_grace).await;

        if self.live_total() > 0 {
            tracing::warn!(
                live = self.live_total(),
                "grace period expired, sending SIGKILL"
            );
            for job in self.jobs.values() {
                job.stop_all(Signal::SIGKILL);
            }
            self.drain_until(self.config.stop_grace).await;
        }

        self.emitter.publish(&Event::Shutdown);
        self.emitter.close();
    }

    async fn drain_until(&mut self, grace: Duration) {
        let deadline = tokio::time::Instant::now() + grace;
        while self.live_total() > 0 {
            match tokio::time::timeout_at(deadline, self.notice_rx.recv()).await {
                Ok(Some(notice)) => {
                    if let Some(job) = self.jobs.get_mut(&notice.job) {
                        if job.reap(notice.process).is_some() {
                            self.emitter.publish(&Event::Exit {
                                job: notice.job,
                                pid: notice.pid,
                                status: notice.status,
                            });
                        }
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
    }

    fn live_total(&self) -> usize {
        self.jobs.values().map(Job::live_len).sum()
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("jobs", &self.jobs.len())
            .field("started", &self.started)
            .finish()
    }
}

/// Spawn processes until the job reaches its desired count. A spawn
/// failure publishes `spawn_error`, counts against the flapping guard,
/// and defers the retry.
fn reconcile_up(
    job: &mut Job,
    emitter: &EventEmitter<Event>,
    notices: &mpsc::UnboundedSender<ExitNotice>,
    cmd_tx: &mpsc::UnboundedSender<Command>,
    flap: &FlapGuard,
) {
    while job.state() == JobState::Running
        && job.needs_more()
        && !job.is_paused(Instant::now())
    {
        match job.spawn_one(notices) {
            Ok((_, pid)) => {
                emitter.publish(&Event::Spawn {
                    job: job.name().clone(),
                    pid,
                });
            }
            Err(e) => {
                tracing::error!(job = %job.name(), error = %e, "spawn failed");
                emitter.publish(&Event::SpawnError {
                    job: job.name().clone(),
                    error: e.to_string(),
                });
                let now = Instant::now();
                if job.record_restart(flap, now) {
                    emitter.publish(&Event::Flapping {
                        job: job.name().clone(),
                    });
                    schedule(
                        cmd_tx,
                        flap.window,
                        Command::FlapResume {
                            name: job.name().clone(),
                        },
                    );
                } else {
                    schedule(
                        cmd_tx,
                        SPAWN_RETRY_DELAY,
                        Command::Reconcile {
                            name: job.name().clone(),
                        },
                    );
                }
                break;
            }
        }
    }
}

/// Deliver a command back to the loop after a delay.
fn schedule(cmd_tx: &mpsc::UnboundedSender<Command>, delay: Duration, cmd: Command) {
    let tx = cmd_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = tx.send(cmd);
    });
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

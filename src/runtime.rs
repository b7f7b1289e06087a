//! Client API of the ISP control runtime.
//!
//! [`IspRuntime`] owns the hardware collaborators and, between the first
//! `init` and the last `deinit`, one session: the shared [`IspSystem`] and
//! the three worker threads. Every entry point takes the lifecycle lock,
//! validates its parameters before anything is posted, moves the parameter
//! block into a message and, for synchronous calls, blocks on the message's
//! completion while still holding the lock. Calls are therefore serialized
//! and a client never observes a half-started or half-stopped session.
//!
//! ```ignore
//! let runtime = IspRuntime::new(config, driver, irq, Box::new(BasicAlgorithms::default()))?;
//! runtime.init(0, InitParam::new(isp_id, size, tuning, callback))?;
//! runtime.video_start(0, VideoStartParam::preview(size))?;
//! runtime.ioctl(0, IoctlCmd::Brightness.raw(), IoctlParam::Value(4))?;
//! runtime.video_stop(0)?;
//! runtime.deinit(0)?;
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use isp_hal::{HandleId, InterruptSource, RegisterDriver};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::algorithm::AlgorithmSuite;
use crate::config::{IspConfig, MAX_HANDLE_SLOTS};
use crate::ctrl_worker::CtrlWorker;
use crate::error::{IspError, IspResult};
use crate::ioctl::{IoctlOutput, IoctlParam, IoctlRequest, CMD_MASK};
use crate::messages::{CtrlEvent, CtrlMsg, Message, Pending, ProcEvent, ProcMsg, Reply};
use crate::monitor::MonitorWorker;
use crate::msg_queue::MessageQueue;
use crate::params::{
    CallbackEvent, CapabilityCmd, CapabilityValue, InitParam, ProcNextParam, ProcStartParam,
    VideoStartParam,
};
use crate::proc_worker::ProcWorker;
use crate::system::{IspSystem, SharedAlgorithms, SystemStatus};

struct Session {
    system: Arc<IspSystem>,
    irq: Arc<dyn InterruptSource>,
    ctrl: Option<JoinHandle<()>>,
    proc: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Lifecycle {
    active: BTreeSet<HandleId>,
    session: Option<Session>,
}

impl Lifecycle {
    /// System of the running session, provided `handle` is active.
    fn system_for(&self, handle: HandleId) -> IspResult<&Arc<IspSystem>> {
        match &self.session {
            Some(session) if self.active.contains(&handle) => Ok(&session.system),
            _ => Err(IspError::NotInitialized(handle)),
        }
    }
}

/// The ISP control runtime.
pub struct IspRuntime {
    config: IspConfig,
    driver: Arc<dyn RegisterDriver>,
    irq: Arc<dyn InterruptSource>,
    algorithms: SharedAlgorithms,
    lifecycle: Mutex<Lifecycle>,
}

impl IspRuntime {
    /// Create a runtime. No thread runs and the device stays closed until
    /// the first [`Self::init`].
    ///
    /// # Errors
    ///
    /// `Config` if `config` does not validate.
    pub fn new(
        config: IspConfig,
        driver: Arc<dyn RegisterDriver>,
        irq: Arc<dyn InterruptSource>,
        algorithms: Box<dyn AlgorithmSuite>,
    ) -> IspResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            driver,
            irq,
            algorithms: Arc::new(Mutex::new(algorithms)),
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }

    /// Initialize `handle`. The first init opens the device and starts the
    /// worker threads.
    ///
    /// # Errors
    ///
    /// - `Param`/`ParamNull` if `param` does not validate or `handle` is out
    ///   of range; nothing is posted in that case
    /// - `HandleInUse` if `handle` is already active
    /// - `HandleLimit` if `runtime.max_handles` handles are active
    /// - `WorkerSpawn`, `Hardware` or a queue error if the session could not
    ///   start
    pub fn init(&self, handle: HandleId, param: InitParam) -> IspResult<()> {
        param.validate()?;
        if usize::try_from(handle).map_or(true, |i| i >= MAX_HANDLE_SLOTS) {
            return Err(IspError::Param(format!(
                "handle {handle} out of range (0..{MAX_HANDLE_SLOTS})"
            )));
        }

        let mut life = self.lifecycle.lock();
        if life.active.contains(&handle) {
            return Err(IspError::HandleInUse(handle));
        }
        let max = self.config.runtime.max_handles;
        if life.active.len() >= max {
            return Err(IspError::HandleLimit { max });
        }

        if life.session.is_none() {
            life.session = Some(self.start_session()?);
        }
        let Some(session) = life.session.as_ref() else {
            return Err(IspError::NotInitialized(handle));
        };

        match call(&session.system, CtrlMsg::init(handle, param)) {
            Ok(_) => {
                life.active.insert(handle);
                info!(handle, active = life.active.len(), "handle active");
                Ok(())
            }
            Err(e) => {
                warn!(handle, error = %e, "init failed");
                if life.active.is_empty() {
                    if let Some(session) = life.session.take() {
                        self.release_last(session, handle);
                    }
                }
                Err(e)
            }
        }
    }

    /// Release `handle`. The last deinit stops the hardware, waits for the
    /// interrupt monitor to drain, and shuts the workers down.
    ///
    /// # Errors
    ///
    /// `NotInitialized` if `handle` is not active.
    pub fn deinit(&self, handle: HandleId) -> IspResult<()> {
        let mut life = self.lifecycle.lock();
        let system = Arc::clone(life.system_for(handle)?);

        if life.active.len() > 1 {
            call(&system, CtrlMsg::deinit(handle, false))?;
            life.active.remove(&handle);
            info!(handle, active = life.active.len(), "handle released");
            return Ok(());
        }

        life.active.remove(&handle);
        if let Some(session) = life.session.take() {
            self.release_last(session, handle);
        }
        info!(handle, "last handle released, session closed");
        Ok(())
    }

    /// Run one IOCTL. Unless the high bit of `cmd` is set, `ctrl_callback`
    /// is invoked on the calling thread once the command succeeded.
    ///
    /// An id that names no command is accepted and has no effect.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, `Param` for a parameter that does not fit the
    /// command, or a queue error.
    pub fn ioctl(&self, handle: HandleId, cmd: u32, param: IoctlParam) -> IspResult<IoctlOutput> {
        let request = IoctlRequest::new(cmd, param);
        let suppress = request.suppress_callback();
        let (output, callback) = {
            let life = self.lifecycle.lock();
            let system = life.system_for(handle)?;
            let callback = system
                .contexts
                .with(handle, |ctx| ctx.ctrl_callback.clone())?;
            let output = match call(system, CtrlMsg::ioctl(handle, request))? {
                Reply::Ioctl(output) => output,
                other => return Err(unexpected(other)),
            };
            (output, callback)
        };

        if !suppress {
            if let Some(callback) = callback {
                callback(handle, CallbackEvent::Ctrl { cmd: cmd & CMD_MASK });
            }
        }
        Ok(output)
    }

    /// Answer a read-only query from the driver limits or the handle's
    /// context, without going through the control worker.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, or `NoSupport` if the driver does not report the
    /// requested limit.
    pub fn capability(&self, handle: HandleId, cmd: CapabilityCmd) -> IspResult<CapabilityValue> {
        let life = self.lifecycle.lock();
        let system = life.system_for(handle)?;
        let value = match cmd {
            CapabilityCmd::VideoSize => CapabilityValue::Size(
                self.driver
                    .video_size_limit()
                    .ok_or_else(|| IspError::NoSupport("video size limit".into()))?,
            ),
            CapabilityCmd::CaptureSize => CapabilityValue::Size(
                self.driver
                    .capture_size_limit()
                    .ok_or_else(|| IspError::NoSupport("capture size limit".into()))?,
            ),
            CapabilityCmd::LowLuxEnabled => {
                CapabilityValue::Flag(system.contexts.with(handle, |ctx| ctx.ae.low_lux)?)
            }
            CapabilityCmd::CurrentIso => {
                CapabilityValue::Value(system.contexts.with(handle, |ctx| ctx.ae.current_iso)?)
            }
            CapabilityCmd::DenoiseLevel => {
                CapabilityValue::Value(system.contexts.with(handle, |ctx| ctx.af.denoise_level)?)
            }
        };
        debug!(handle, cmd = ?cmd, value = ?value, "capability");
        Ok(value)
    }

    /// Start video on `handle` and wait until the pipeline runs.
    ///
    /// # Errors
    ///
    /// `Param` for an odd or empty size (status is left untouched),
    /// `NotInitialized`, or the hardware error that stopped the start.
    pub fn video_start(&self, handle: HandleId, param: VideoStartParam) -> IspResult<()> {
        param.validate()?;
        let life = self.lifecycle.lock();
        let system = life.system_for(handle)?;
        call(system, CtrlMsg::video_start(handle, param)).map(drop)
    }

    /// Stop video on `handle`.
    ///
    /// # Errors
    ///
    /// `NotInitialized` or a queue error.
    pub fn video_stop(&self, handle: HandleId) -> IspResult<()> {
        let life = self.lifecycle.lock();
        let system = life.system_for(handle)?;
        call(system, CtrlMsg::video_stop(handle)).map(drop)
    }

    /// Start a sliced single-frame process. Returns once the request is
    /// queued; completion arrives as [`CallbackEvent::ProcEnd`].
    ///
    /// # Errors
    ///
    /// `Param` for invalid geometry, `NotInitialized`, or a queue error.
    pub fn proc_start(&self, handle: HandleId, param: ProcStartParam) -> IspResult<()> {
        param.validate()?;
        let life = self.lifecycle.lock();
        let system = life.system_for(handle)?;
        system.ctrl_queue.post(CtrlMsg::proc_start(handle, param))
    }

    /// Feed the next input slice of a running process. Fire-and-forget.
    ///
    /// # Errors
    ///
    /// `Param` for invalid geometry, `NotInitialized`, or a queue error.
    pub fn proc_next(&self, handle: HandleId, param: ProcNextParam) -> IspResult<()> {
        param.validate()?;
        let life = self.lifecycle.lock();
        let system = life.system_for(handle)?;
        system.ctrl_queue.post(CtrlMsg::proc_next(handle, param))
    }

    /// Round-trip `tag` through the control queue. When this returns, every
    /// message queued before it has been handled.
    ///
    /// # Errors
    ///
    /// `NotInitialized` or a queue error.
    pub fn sync(&self, handle: HandleId, tag: u32) -> IspResult<u32> {
        let life = self.lifecycle.lock();
        let system = life.system_for(handle)?;
        match call(system, CtrlMsg::sync(handle, tag))? {
            Reply::Sync(echo) => Ok(echo),
            other => Err(unexpected(other)),
        }
    }

    /// Number of active handles.
    pub fn handle_count(&self) -> usize {
        self.lifecycle.lock().active.len()
    }

    /// Process-level status; `Close` when no session runs.
    pub fn status(&self) -> SystemStatus {
        self.lifecycle
            .lock()
            .session
            .as_ref()
            .map_or(SystemStatus::Close, |session| session.system.status())
    }

    /// Release every active handle and stop the workers. Safe to call more
    /// than once; also run on drop.
    pub fn shutdown(&self) {
        let mut life = self.lifecycle.lock();
        let Some(session) = life.session.take() else {
            return;
        };
        info!(active = life.active.len(), "shutting down ISP runtime");
        let active = std::mem::take(&mut life.active);
        let mut handles = active.into_iter();
        let last = handles.next_back();
        for handle in handles {
            if let Err(e) = call(&session.system, CtrlMsg::deinit(handle, false)) {
                warn!(handle, error = %e, "deinit during shutdown failed");
            }
        }
        match last {
            Some(handle) => self.release_last(session, handle),
            None => stop_workers(session, false),
        }
    }

    fn start_session(&self) -> IspResult<Session> {
        let system = Arc::new(IspSystem::new(
            self.config.clone(),
            Arc::clone(&self.driver),
            Arc::clone(&self.algorithms),
        )?);
        let mut session = Session {
            system: Arc::clone(&system),
            irq: Arc::clone(&self.irq),
            ctrl: None,
            proc: None,
            monitor: None,
        };

        let started = (|| -> IspResult<()> {
            let ctrl = CtrlWorker::new(Arc::clone(&system));
            session.ctrl = Some(spawn("isp-ctrl", move || ctrl.run())?);
            call(&system, CtrlMsg::common(CtrlEvent::Start, 0))?;

            let proc = ProcWorker::new(Arc::clone(&system));
            session.proc = Some(spawn("isp-proc", move || proc.run())?);
            post_and_wait(&system.proc_queue, ProcMsg::common(ProcEvent::Start, 0))?;

            let monitor = MonitorWorker::new(Arc::clone(&system), Arc::clone(&self.irq));
            session.monitor = Some(spawn("isp-monitor", move || monitor.run())?);
            Ok(())
        })();

        match started {
            Ok(()) => {
                info!("ISP session started");
                Ok(session)
            }
            Err(e) => {
                error!(error = %e, "failed to start ISP session");
                stop_workers(session, false);
                Err(e)
            }
        }
    }

    /// Stop the hardware through the last handle's deinit, then the workers.
    fn release_last(&self, session: Session, handle: HandleId) {
        let stopped = call(&session.system, CtrlMsg::deinit(handle, true));
        if let Err(e) = &stopped {
            warn!(handle, error = %e, "hardware did not report stop");
        }
        stop_workers(session, stopped.is_ok());
    }
}

impl Drop for IspRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Post a request to the control worker and wait for its reply.
fn call(system: &IspSystem, request: (CtrlMsg, Pending)) -> IspResult<Reply> {
    post_and_wait(&system.ctrl_queue, request)
}

fn post_and_wait<E>(
    queue: &MessageQueue<Message<E>>,
    (msg, pending): (Message<E>, Pending),
) -> IspResult<Reply> {
    queue.post(msg)?;
    pending.wait()?
}

fn unexpected(reply: Reply) -> IspError {
    IspError::Param(format!("unexpected reply {reply:?}"))
}

fn spawn(name: &'static str, f: impl FnOnce() + Send + 'static) -> IspResult<JoinHandle<()>> {
    thread::Builder::new()
        .name(name.into())
        .spawn(f)
        .map_err(|source| IspError::WorkerSpawn { name, source })
}

fn join(worker: JoinHandle<()>) {
    let name = worker.thread().name().unwrap_or("worker").to_string();
    if worker.join().is_err() {
        error!(worker = %name, "worker thread panicked");
    }
}

/// Stop proc and control workers, destroy the queues and join.
///
/// A monitor that did not see `STOP` is still blocked on the interrupt
/// source; it is woken and exits once it finds its queue destroyed. Should
/// the wake fail it is detached, and the interrupt it eventually consumes
/// is lost to the next session.
fn stop_workers(mut session: Session, monitor_exited: bool) {
    let system = &session.system;
    if session.proc.as_ref().is_some_and(|h| !h.is_finished()) {
        if let Err(e) = post_and_wait(&system.proc_queue, ProcMsg::common(ProcEvent::Stop, 0)) {
            warn!(error = %e, "proc worker did not acknowledge stop");
        }
    }
    let ctrl_stopped = session.ctrl.as_ref().is_some_and(|h| !h.is_finished())
        && match call(system, CtrlMsg::common(CtrlEvent::Stop, 0)) {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "control worker did not acknowledge stop");
                false
            }
        };
    if !ctrl_stopped && session.ctrl.is_some() {
        // The control worker closes the device on STOP; it is gone.
        if let Err(e) = system.driver.close() {
            warn!(error = %e, "failed to close ISP device");
        }
        system.set_status(SystemStatus::Close);
    }
    system.destroy_queues();
    system.contexts.clear();

    for worker in [session.proc.take(), session.ctrl.take()].into_iter().flatten() {
        join(worker);
    }
    if let Some(monitor) = session.monitor.take() {
        if monitor_exited || monitor.is_finished() {
            join(monitor);
        } else if let Err(e) = session.irq.wake() {
            warn!(error = %e, "detaching interrupt monitor that did not see STOP");
        } else {
            join(monitor);
        }
    }
}

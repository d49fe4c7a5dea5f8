use crate::result::BuildResult;

/// Everything the build worker reports to the caller, in emission order.
#[derive(Clone, Debug)]
pub enum BuildEvent {
    Started { project: String, tasks: usize },
    TaskStarted { name: &'static str, index: usize, total: usize },
    TaskCompleted { name: &'static str },
    TaskFailed { name: &'static str, error: String },
    Progress { percent: u8, message: String },
    Log(String),
    Completed(BuildResult),
}

/// Callback surface for a running build. Every method has an empty default
/// so listeners implement only what they display.
pub trait BuildListener {
    fn on_build_started(&mut self, _project: &str, _tasks: usize) {}
    fn on_task_started(&mut self, _name: &str, _index: usize, _total: usize) {}
    fn on_task_completed(&mut self, _name: &str) {}
    fn on_task_failed(&mut self, _name: &str, _error: &str) {}
    fn on_progress(&mut self, _percent: u8, _message: &str) {}
    fn on_log(&mut self, _line: &str) {}
    fn on_build_completed(&mut self, _result: &BuildResult) {}
}

impl BuildEvent {
    pub fn deliver(&self, listener: &mut dyn BuildListener) {
        match self {
            BuildEvent::Started { project, tasks } => listener.on_build_started(project, *tasks),
            BuildEvent::TaskStarted { name, index, total } => {
                listener.on_task_started(name, *index, *total)
            }
            BuildEvent::TaskCompleted { name } => listener.on_task_completed(name),
            BuildEvent::TaskFailed { name, error } => listener.on_task_failed(name, error),
            BuildEvent::Progress { percent, message } => listener.on_progress(*percent, message),
            BuildEvent::Log(line) => listener.on_log(line),
            BuildEvent::Completed(result) => listener.on_build_completed(result),
        }
    }
}

/// Listener that ignores everything.
pub struct NoopListener;

impl BuildListener for NoopListener {}

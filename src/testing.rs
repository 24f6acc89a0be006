//! Instrumented in-memory engine used by the unit tests.

use crate::engine::{
    Callback, Engine, EngineEvent, RenderApi, RenderBackend, RenderContext, RenderTarget,
};
use crate::property::{Format, Property, PropertyValue};
use crate::Error;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    SetOption(String, PropertyValue),
    Initialize,
    SetProperty(String, PropertyValue),
    Command(Vec<String>),
    Observe(u64, String, Format),
    CreateRenderContext(&'static str),
    Render { width: u32, height: u32, flip_y: bool },
    FreeRenderContext,
    Terminate,
}

#[derive(Default)]
pub(crate) struct FakeState {
    calls: Mutex<Vec<Call>>,
    events: Mutex<VecDeque<EngineEvent>>,
    wakeup: Mutex<Option<Callback>>,
    update: Mutex<Option<Callback>>,
    properties: Mutex<HashMap<String, PropertyValue>>,
    fail_init: bool,
    fail_render_context: bool,
}

impl FakeState {
    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

/// Test-side handle to a [`FakeEngine`] that has been moved into a surface.
#[derive(Clone)]
pub(crate) struct FakeHandle(Arc<FakeState>);

impl FakeHandle {
    pub fn calls(&self) -> Vec<Call> {
        self.0.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.0.calls.lock().clear();
    }

    /// Every value written to `name` through `set_property`, in order.
    pub fn writes(&self, name: &str) -> Vec<PropertyValue> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SetProperty(n, value) if n == name => Some(value),
                _ => None,
            })
            .collect()
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Command(args) => Some(args),
                _ => None,
            })
            .collect()
    }

    /// Queues an event without waking anyone.
    pub fn queue(&self, event: EngineEvent) {
        self.0.events.lock().push_back(event);
    }

    /// Queues an event and fires the wakeup callback, as the engine thread would.
    pub fn push(&self, event: EngineEvent) {
        self.queue(event);
        let wakeup = self.0.wakeup.lock().clone();
        if let Some(wakeup) = wakeup {
            wakeup();
        }
    }

    pub fn push_property(&self, property: Property, value: PropertyValue) {
        self.push(EngineEvent::PropertyChange {
            reply_id: property.reply_id(),
            name: property.name().to_owned(),
            value,
        });
    }

    pub fn pending_events(&self) -> usize {
        self.0.events.lock().len()
    }

    pub fn fire_frame_ready(&self) {
        let update = self.0.update.lock().clone();
        if let Some(update) = update {
            update();
        }
    }

    pub fn has_wakeup_callback(&self) -> bool {
        self.0.wakeup.lock().is_some()
    }
}

pub(crate) struct FakeEngine {
    state: Arc<FakeState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(FakeState::default()),
        }
    }

    pub fn failing_init() -> Self {
        Self {
            state: Arc::new(FakeState {
                fail_init: true,
                ..Default::default()
            }),
        }
    }

    pub fn failing_render_context() -> Self {
        Self {
            state: Arc::new(FakeState {
                fail_render_context: true,
                ..Default::default()
            }),
        }
    }

    pub fn handle(&self) -> FakeHandle {
        FakeHandle(Arc::clone(&self.state))
    }
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        self.state.record(Call::Terminate);
    }
}

struct FakeRenderContext {
    state: Arc<FakeState>,
}

impl RenderContext for FakeRenderContext {
    fn render(&mut self, target: RenderTarget<'_>) -> Result<(), Error> {
        let (width, height) = target.size();
        self.state.record(Call::Render {
            width,
            height,
            flip_y: target.flip_y(),
        });
        Ok(())
    }

    fn set_update_callback(&mut self, callback: Option<Callback>) {
        *self.state.update.lock() = callback;
    }
}

impl Drop for FakeRenderContext {
    fn drop(&mut self) {
        *self.state.update.lock() = None;
        self.state.record(Call::FreeRenderContext);
    }
}

impl RenderBackend for FakeEngine {
    fn create_render_context(&self, api: RenderApi<'_>) -> Result<Box<dyn RenderContext>, Error> {
        let name = match api {
            RenderApi::OpenGl { get_proc_address } => {
                get_proc_address("glGetString");
                "opengl"
            }
            RenderApi::Software => "software",
        };
        self.state.record(Call::CreateRenderContext(name));
        if self.state.fail_render_context {
            return Err(Error::RenderContext("fake backend refused".into()));
        }
        Ok(Box::new(FakeRenderContext {
            state: Arc::clone(&self.state),
        }))
    }
}

impl Engine for FakeEngine {
    fn set_option(&self, name: &str, value: PropertyValue) -> Result<(), Error> {
        self.state.record(Call::SetOption(name.to_owned(), value));
        Ok(())
    }

    fn initialize(&self) -> Result<(), Error> {
        self.state.record(Call::Initialize);
        if self.state.fail_init {
            return Err(Error::EngineInit("fake engine refused".into()));
        }
        Ok(())
    }

    fn set_property(&self, name: &str, value: PropertyValue) -> Result<(), Error> {
        self.state
            .record(Call::SetProperty(name.to_owned(), value.clone()));
        self.state.properties.lock().insert(name.to_owned(), value);
        Ok(())
    }

    fn get_property(&self, name: &str, format: Format) -> Result<PropertyValue, Error> {
        let properties = self.state.properties.lock();
        let value = properties
            .get(name)
            .ok_or_else(|| Error::PropertyNotFound(name.to_owned()))?;
        value
            .convert(format)
            .ok_or_else(|| Error::invalid_value(name, value))
    }

    fn command(&self, args: &[&str]) -> Result<(), Error> {
        self.state
            .record(Call::Command(args.iter().map(|s| s.to_string()).collect()));
        Ok(())
    }

    fn observe_property(&self, reply_id: u64, name: &str, format: Format) -> Result<(), Error> {
        self.state
            .record(Call::Observe(reply_id, name.to_owned(), format));
        Ok(())
    }

    fn poll_event(&self) -> Option<EngineEvent> {
        self.state.events.lock().pop_front()
    }

    fn set_wakeup_callback(&self, callback: Option<Callback>) {
        *self.state.wakeup.lock() = callback;
    }
}

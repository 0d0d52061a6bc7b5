//! Adapter factory and per-shape dispatch.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::config::{AdapterOptions, DeclaredType, Execution, Multiplicity, ReturnShape, Wrapping};
use crate::bridge::{BodyFlux, CallEnqueueFlux, CallExecuteFlux};
use crate::call::{Response, SharedCall};
use crate::error::CallError;
use crate::flux::{Flux, Mono, Scheduler};
use crate::observability::{FaultReporter, global_reporter};

/// Hands out [`CallAdapter`]s configured with one set of [`AdapterOptions`].
#[derive(Debug, Clone, Default)]
pub struct CallAdapterFactory {
    options: AdapterOptions,
}

impl CallAdapterFactory {
    /// Blocking execution on the demanding thread, no scheduler.
    pub fn create() -> Self {
        Self::default()
    }

    /// Callback-based execution. A scheduler has no effect on where these
    /// calls complete.
    pub fn create_async() -> Self {
        Self::with_options(AdapterOptions::new().with_execution(Execution::Async))
    }

    /// Blocking execution, subscribed on `scheduler`.
    pub fn create_with_scheduler(scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_options(AdapterOptions::new().with_scheduler(scheduler))
    }

    pub fn with_options(options: AdapterOptions) -> Self {
        Self { options }
    }

    pub fn with_fault_reporter(mut self, reporter: Arc<dyn FaultReporter>) -> Self {
        self.options.fault_reporter = Some(reporter);
        self
    }

    pub fn options(&self) -> &AdapterOptions {
        &self.options
    }

    /// Adapter for an explicit shape.
    pub fn adapter<T: Send + 'static>(&self, shape: ReturnShape) -> CallAdapter<T> {
        CallAdapter::new(
            DeclaredType::new(std::any::type_name::<T>()),
            shape,
            self.options.clone(),
        )
    }

    /// Resolve an adapter from a declared return type.
    ///
    /// `Ok(None)` means the type is neither `Flux` nor `Mono` and should be
    /// handled elsewhere. `Flux`, `Mono` and `Response` must carry a type
    /// parameter.
    pub fn get<T: Send + 'static>(
        &self,
        declared: &DeclaredType,
    ) -> Result<Option<CallAdapter<T>>, CallError> {
        let multiplicity = match declared.name() {
            "Flux" => Multiplicity::Stream,
            "Mono" => Multiplicity::Single,
            _ => return Ok(None),
        };

        let name = declared.name();
        let emitted = declared.first_param().ok_or_else(|| {
            CallError::ConfigurationError(format!(
                "{name} return type must be parameterized as {name}<Foo> or {name}<? extends Foo>"
            ))
        })?;

        let (wrapping, response_type) = if emitted.name() == "Response" {
            let payload = emitted.first_param().ok_or_else(|| {
                CallError::ConfigurationError(
                    "Response must be parameterized as Response<Foo> or Response<? extends Foo>"
                        .into(),
                )
            })?;
            (Wrapping::FullResponse, payload.clone())
        } else {
            (Wrapping::BodyOnly, emitted.clone())
        };

        tracing::debug!(
            target: "callflux::adapter",
            declared = %declared,
            response_type = %response_type,
            ?multiplicity,
            ?wrapping,
            "resolved adapter"
        );
        Ok(Some(CallAdapter::new(
            response_type,
            ReturnShape::new(multiplicity, wrapping),
            self.options.clone(),
        )))
    }
}

/// Turns a call into the stream shape it was resolved for.
pub struct CallAdapter<T> {
    response_type: DeclaredType,
    shape: ReturnShape,
    options: AdapterOptions,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for CallAdapter<T> {
    fn clone(&self) -> Self {
        Self {
            response_type: self.response_type.clone(),
            shape: self.shape,
            options: self.options.clone(),
            _payload: PhantomData,
        }
    }
}

impl<T> fmt::Debug for CallAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallAdapter")
            .field("response_type", &self.response_type)
            .field("shape", &self.shape)
            .field("options", &self.options)
            .finish()
    }
}

impl<T: Send + 'static> CallAdapter<T> {
    pub fn new(response_type: DeclaredType, shape: ReturnShape, options: AdapterOptions) -> Self {
        Self {
            response_type,
            shape,
            options,
            _payload: PhantomData,
        }
    }

    /// Payload type the call decodes, with any `Response` wrapper removed.
    pub fn response_type(&self) -> &DeclaredType {
        &self.response_type
    }

    pub fn shape(&self) -> ReturnShape {
        self.shape
    }

    /// Wrap `call`. Nothing runs until the result is subscribed and demanded.
    pub fn adapt(&self, call: SharedCall<T>) -> Adapted<T> {
        let reporter = self
            .options
            .fault_reporter
            .clone()
            .unwrap_or_else(global_reporter);
        let responses = match self.options.execution {
            Execution::Sync => CallExecuteFlux::create(call, reporter.clone()),
            Execution::Async => CallEnqueueFlux::create(call, reporter.clone()),
        };

        match (self.shape.wrapping, self.shape.multiplicity) {
            (Wrapping::FullResponse, Multiplicity::Stream) => {
                Adapted::ResponseStream(self.scheduled(responses))
            }
            (Wrapping::FullResponse, Multiplicity::Single) => {
                Adapted::ResponseSingle(self.scheduled(responses).last())
            }
            (Wrapping::BodyOnly, Multiplicity::Stream) => {
                Adapted::BodyStream(self.scheduled(BodyFlux::create(responses, reporter)))
            }
            (Wrapping::BodyOnly, Multiplicity::Single) => {
                Adapted::BodySingle(self.scheduled(BodyFlux::create(responses, reporter)).last())
            }
        }
    }

    fn scheduled<U: Send + 'static>(&self, flux: Flux<U>) -> Flux<U> {
        match &self.options.scheduler {
            Some(scheduler) => flux.subscribe_on(scheduler.clone()),
            None => flux,
        }
    }
}

/// Result of [`CallAdapter::adapt`], one variant per [`ReturnShape`].
pub enum Adapted<T> {
    ResponseStream(Flux<Response<T>>),
    BodyStream(Flux<T>),
    ResponseSingle(Mono<Response<T>>),
    BodySingle(Mono<T>),
}

impl<T> Adapted<T> {
    pub fn shape(&self) -> ReturnShape {
        match self {
            Self::ResponseStream(_) => ReturnShape::response_stream(),
            Self::BodyStream(_) => ReturnShape::body_stream(),
            Self::ResponseSingle(_) => ReturnShape::response_single(),
            Self::BodySingle(_) => ReturnShape::body_single(),
        }
    }

    pub fn into_response_stream(self) -> Result<Flux<Response<T>>, CallError> {
        match self {
            Self::ResponseStream(flux) => Ok(flux),
            other => Err(other.mismatch(ReturnShape::response_stream())),
        }
    }

    pub fn into_body_stream(self) -> Result<Flux<T>, CallError> {
        match self {
            Self::BodyStream(flux) => Ok(flux),
            other => Err(other.mismatch(ReturnShape::body_stream())),
        }
    }

    pub fn into_response_single(self) -> Result<Mono<Response<T>>, CallError> {
        match self {
            Self::ResponseSingle(mono) => Ok(mono),
            other => Err(other.mismatch(ReturnShape::response_single())),
        }
    }

    pub fn into_body_single(self) -> Result<Mono<T>, CallError> {
        match self {
            Self::BodySingle(mono) => Ok(mono),
            other => Err(other.mismatch(ReturnShape::body_single())),
        }
    }

    fn mismatch(&self, wanted: ReturnShape) -> CallError {
        CallError::ConfigurationError(format!(
            "adapted shape {:?} requested as {:?}",
            self.shape(),
            wanted
        ))
    }
}

impl<T> fmt::Debug for Adapted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Adapted").field(&self.shape()).finish()
    }
}

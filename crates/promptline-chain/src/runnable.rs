use anyhow::Result;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::marker::PhantomData;
use std::pin::Pin;

/// Stream of results produced by a pipeline stage
pub type RunStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// A pipeline stage: prompt template, model, parser, or a composition of them
///
/// `invoke` runs the stage once. `transform` maps a stream of inputs to a stream
/// of outputs and is what makes streaming flow through a composed pipeline: the
/// default calls `invoke` for every input, stages that can do better (a model
/// producing fragments, a parser that needs the whole text) override it.
#[async_trait]
pub trait Runnable: Send + Sync {
    type Input: Send + 'static;
    type Output: Send + 'static;

    async fn invoke(&self, input: Self::Input) -> Result<Self::Output>;

    fn transform<'a>(&'a self, inputs: RunStream<'a, Self::Input>) -> RunStream<'a, Self::Output> {
        Box::pin(inputs.and_then(move |input| self.invoke(input)))
    }

    /// Run the stage on one input, yielding outputs as they become available
    fn stream<'a>(&'a self, input: Self::Input) -> RunStream<'a, Self::Output> {
        self.transform(Box::pin(futures::stream::once(futures::future::ready(Ok(input)))))
    }
}

/// Two stages run back to back; the output of `first` feeds `second`
pub struct Pipe<A, B> {
    first: A,
    second: B,
}

impl<A, B> Pipe<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }

    pub fn first(&self) -> &A {
        &self.first
    }

    pub fn second(&self) -> &B {
        &self.second
    }
}

#[async_trait]
impl<A, B> Runnable for Pipe<A, B>
where
    A: Runnable,
    B: Runnable<Input = A::Output>,
{
    type Input = A::Input;
    type Output = B::Output;

    async fn invoke(&self, input: Self::Input) -> Result<Self::Output> {
        let intermediate = self.first.invoke(input).await?;
        self.second.invoke(intermediate).await
    }

    fn transform<'a>(&'a self, inputs: RunStream<'a, Self::Input>) -> RunStream<'a, Self::Output> {
        self.second.transform(self.first.transform(inputs))
    }
}

pub trait RunnableExt: Runnable + Sized {
    /// Compose `self` with `next`, e.g. `prompt.pipe(model).pipe(parser)`
    fn pipe<B>(self, next: B) -> Pipe<Self, B>
    where
        B: Runnable<Input = Self::Output>,
    {
        Pipe::new(self, next)
    }
}

impl<R: Runnable> RunnableExt for R {}

/// A plain function used as a pipeline stage
pub struct RunnableLambda<F, I, O> {
    func: F,
    _marker: PhantomData<fn(I) -> O>,
}

#[async_trait]
impl<F, I, O> Runnable for RunnableLambda<F, I, O>
where
    F: Fn(I) -> Result<O> + Send + Sync,
    I: Send + 'static,
    O: Send + 'static,
{
    type Input = I;
    type Output = O;

    async fn invoke(&self, input: I) -> Result<O> {
        (self.func)(input)
    }
}

/// Wrap a function as a stage, typically to reshape one chain's output into the
/// next chain's input
pub fn lambda<F, I, O>(func: F) -> RunnableLambda<F, I, O>
where
    F: Fn(I) -> Result<O> + Send + Sync,
{
    RunnableLambda {
        func,
        _marker: PhantomData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pipe_invokes_in_order() {
        let chain = lambda(|x: i32| Ok(x + 1))
            .pipe(lambda(|x: i32| Ok(x * 10)))
            .pipe(lambda(|x: i32| Ok(format!("={x}"))));

        assert_eq!(chain.invoke(1).await.unwrap(), "=20");
    }

    #[tokio::test]
    async fn test_error_stops_the_pipe() {
        let chain = lambda(|_: i32| -> Result<i32> { anyhow::bail!("first stage failed") })
            .pipe(lambda(|x: i32| -> Result<i32> { panic!("second stage ran with {x}") }));

        let err = chain.invoke(1).await.unwrap_err();
        assert_eq!(err.to_string(), "first stage failed");
    }

    #[tokio::test]
    async fn test_default_stream_yields_single_output() {
        let stage = lambda(|s: String| Ok(s.to_uppercase()));
        let outputs: Vec<String> = stage.stream("abc".to_string()).try_collect().await.unwrap();

        assert_eq!(outputs, vec!["ABC".to_string()]);
    }

    #[tokio::test]
    async fn test_transform_maps_every_item() {
        let stage = lambda(|x: u8| Ok(x as u32 * 2));
        let inputs: RunStream<'_, u8> = Box::pin(futures::stream::iter(vec![Ok(1), Ok(2), Ok(3)]));

        let outputs: Vec<u32> = stage.transform(inputs).try_collect().await.unwrap();
        assert_eq!(outputs, vec![2, 4, 6]);
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use aotcache::jit::{
    CacheRegistry, CompileError, CompiledFn, Compiler, Dispatch, ResolveOutcome, UserFunction,
};
use aotcache::{ArgValue, ArgsExt, CacheError, Tensor};

fn scale() -> UserFunction {
    UserFunction::new("scale", |args: &[ArgValue]| {
        Ok(vec![args.tensor(0)?.scale(args.number(1)?).into()])
    })
}

/// Compiler that counts invocations and takes `delay` per compile.
fn counting_compiler(count: &Arc<AtomicUsize>, delay: Duration) -> Arc<dyn Compiler> {
    let count = Arc::clone(count);
    Arc::new(move |function: &UserFunction, _: &[ArgValue], _: &str| {
        count.fetch_add(1, Ordering::SeqCst);
        thread::sleep(delay);
        Ok::<CompiledFn, CompileError>(function.body())
    })
}

#[test]
fn concurrent_callers_share_one_compile() -> Result<()> {
    const THREADS: usize = 8;

    let registry = Arc::new(CacheRegistry::new());
    let compiles = Arc::new(AtomicUsize::new(0));
    let dispatch = Dispatch::builder(scale())
        .registry(Arc::clone(&registry))
        .compiler(counting_compiler(&compiles, Duration::from_millis(50)))
        .build()?;
    let barrier = Barrier::new(THREADS);

    let outcomes = thread::scope(|scope| {
        let handles = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    let args = [ArgValue::from(Tensor::full(&[16], 1.0)), ArgValue::Float(2.0)];
                    barrier.wait();
                    dispatch.resolve(&args).map(|resolved| resolved.outcome)
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker panicked"))
            .collect::<Result<Vec<_>, CacheError>>()
    })?;

    assert_eq!(compiles.load(Ordering::SeqCst), 1);
    assert_eq!(registry.recompilation_count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|outcome| **outcome == ResolveOutcome::Compiled)
            .count(),
        1
    );
    Ok(())
}

#[test]
fn distinct_signatures_compile_in_parallel() -> Result<()> {
    let registry = Arc::new(CacheRegistry::new());
    let compiles = Arc::new(AtomicUsize::new(0));
    let dispatch = Dispatch::builder(scale())
        .registry(Arc::clone(&registry))
        .compiler(counting_compiler(&compiles, Duration::from_millis(5)))
        .build()?;

    thread::scope(|scope| {
        for factor in 0..4 {
            let dispatch = &dispatch;
            scope.spawn(move || {
                let args = [
                    ArgValue::from(Tensor::zeros(&[2])),
                    ArgValue::Float(f64::from(factor)),
                ];
                dispatch.call(&args).expect("call failed");
            });
        }
    });

    assert_eq!(compiles.load(Ordering::SeqCst), 4);
    assert_eq!(registry.recompilation_count(), 4);
    Ok(())
}

#[test]
fn failed_compile_leaves_no_entry() -> Result<()> {
    let registry = Arc::new(CacheRegistry::new());
    let attempts = Arc::new(AtomicUsize::new(0));
    let flaky = {
        let attempts = Arc::clone(&attempts);
        move |function: &UserFunction, _: &[ArgValue], backend: &str| {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(CompileError::Rejected(format!("{backend} unavailable")))
            } else {
                Ok::<CompiledFn, CompileError>(function.body())
            }
        }
    };
    let dispatch = Dispatch::builder(scale())
        .registry(Arc::clone(&registry))
        .backend("flaky")
        .compiler(Arc::new(flaky))
        .build()?;
    let args = [ArgValue::from(Tensor::full(&[3], 2.0)), ArgValue::Float(0.5)];

    let err = dispatch.call(&args).unwrap_err();
    match &err {
        CacheError::CompilationFailure { backend, function, source } => {
            assert_eq!(backend, "flaky");
            assert_eq!(function, "scale");
            assert!(matches!(source, CompileError::Rejected(reason) if reason == "flaky unavailable"));
        }
        other => panic!("expected compilation failure, got {other:?}"),
    }
    assert!(!dispatch.is_bound());
    assert_eq!(registry.recompilation_count(), 0);

    let out = dispatch.call(&args)?;
    assert_eq!(out[0].as_tensor().map(Tensor::data), Some(&[1.0, 1.0, 1.0][..]));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(registry.recompilation_count(), 1);
    Ok(())
}

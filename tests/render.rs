mod common;

use airender::element::passthrough;
use airender::{
    create_element, create_render_context, fragment, Children, Element, ErrorKind, RenderContext,
    RenderError, RenderOptions, Renderable,
};
use common::RecordingLogger;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn ctx() -> RenderContext {
    create_render_context(RenderOptions::default())
}

fn words(chunks: &'static [&'static str], delay_ms: u64) -> Renderable {
    Renderable::text_stream(stream::iter(chunks.iter().copied()).then(move |chunk| async move {
        sleep(Duration::from_millis(delay_ms)).await;
        chunk.to_string()
    }))
}

fn explode(_props: &Children, _ctx: &RenderContext) -> airender::Result<Renderable> {
    Err(RenderError::other("component exploded"))
}

#[tokio::test]
async fn literal_list_renders_textual_forms() {
    let text = ctx()
        .render(vec![
            Renderable::from("a"),
            1.into(),
            Renderable::null(),
            None::<&str>.into(),
            false.into(),
            true.into(),
        ])
        .await
        .unwrap();
    assert_eq!(text, "a1");
}

#[tokio::test]
async fn numbers_render_without_trailing_fraction() {
    let text = ctx()
        .render(vec![Renderable::from(0), " ".into(), 2.5.into(), " ".into(), (-7_i64).into()])
        .await
        .unwrap();
    assert_eq!(text, "0 2.5 -7");
}

#[tokio::test]
async fn element_renders_component_output() {
    fn greet(props: &Children, _ctx: &RenderContext) -> airender::Result<Renderable> {
        Ok(Renderable::list(["Hello, ".into(), props.children.clone(), "!".into()]))
    }

    let element = create_element(greet, None::<Children>, vec!["world".into()]);
    assert_eq!(ctx().render(element).await.unwrap(), "Hello, world!");
}

#[tokio::test]
async fn future_resolves_and_renders_under_same_context() {
    let seen = Arc::new(Mutex::new(None));
    let record = Arc::clone(&seen);

    let element = Element::new(
        move |_props: &(), ctx: &RenderContext| {
            let record = Arc::clone(&record);
            let ctx = ctx.clone();
            Ok(Renderable::future(async move {
                sleep(Duration::from_millis(5)).await;
                *record.lock() = Some(ctx.render_id().clone());
                Ok(Renderable::list(["async ".into(), 42.into()]))
            }))
        },
        (),
    );

    let root = ctx();
    assert_eq!(root.render(element).await.unwrap(), "async 42");
    assert!(seen.lock().is_some());
}

#[tokio::test(start_paused = true)]
async fn stream_chunks_are_passed_through_in_order() {
    let chunks: Vec<String> = ctx()
        .render(words(&["one ", "two ", "three"], 3))
        .map(|chunk| chunk.unwrap())
        .collect()
        .await;
    assert_eq!(chunks, vec!["one ", "two ", "three"]);
}

#[tokio::test(start_paused = true)]
async fn list_of_streams_emits_in_declared_order() {
    let tree = Renderable::list([
        words(&["slow-1 ", "slow-2 "], 40),
        "| ".into(),
        words(&["fast-1 ", "fast-2"], 1),
    ]);

    let chunks: Vec<String> = ctx()
        .render(tree)
        .map(|chunk| chunk.unwrap())
        .collect()
        .await;
    assert_eq!(chunks, vec!["slow-1 ", "slow-2 ", "| ", "fast-1 ", "fast-2"]);
}

#[tokio::test(start_paused = true)]
async fn siblings_render_concurrently() {
    let tree = Renderable::list(
        (0..4)
            .map(|i| {
                Renderable::future(async move {
                    sleep(Duration::from_millis(100)).await;
                    Ok(Renderable::from(i))
                })
            })
            .collect::<Vec<_>>(),
    );

    let started = tokio::time::Instant::now();
    assert_eq!(ctx().render(tree).await.unwrap(), "0123");
    assert!(started.elapsed() < Duration::from_millis(200));
}

#[tokio::test]
async fn falsy_children_are_skipped_but_zero_is_kept() {
    let tree = fragment(vec![
        Renderable::from(fragment("a")),
        false.into(),
        Renderable::null(),
        0.into(),
        words(&["b"], 0),
    ]);
    assert_eq!(ctx().render(tree).await.unwrap(), "a0b");
}

#[tokio::test]
async fn partial_iteration_then_await_returns_remainder() {
    let mut result = ctx().render(Renderable::list([
        words(&["first"], 0),
        words(&["second"], 0),
    ]));
    assert_eq!(result.next().await.unwrap().unwrap(), "first");
    assert_eq!(result.await.unwrap(), "second");
}

struct Forward {
    seen: Arc<Mutex<Vec<RenderContext>>>,
    child: Renderable,
}

fn forward(props: &Forward, ctx: &RenderContext) -> airender::Result<Renderable> {
    props.seen.lock().push(ctx.clone());
    Ok(props.child.clone())
}

#[tokio::test]
async fn nested_passthrough_chain_matches_innermost_output() {
    let innermost = || Renderable::list(["deep ".into(), 5.into()]);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut tree = innermost();
    for _ in 0..5 {
        tree = Element::new(
            forward,
            Forward {
                seen: Arc::clone(&seen),
                child: tree,
            },
        )
        .into();
    }

    let root = ctx();
    let nested = root.render(tree).await.unwrap();
    let direct = root.render(innermost()).await.unwrap();
    assert_eq!(nested, direct);

    let nodes = seen.lock().clone();
    assert_eq!(nodes.len(), 5);
    assert!(RenderContext::same_node(nodes[0].parent().unwrap(), &root));
    for pair in nodes.windows(2) {
        let (outer, inner) = (&pair[0], &pair[1]);
        assert_ne!(outer.render_id(), inner.render_id());
        assert!(RenderContext::same_node(inner.parent().unwrap(), outer));
    }
    let mut ids: Vec<_> = nodes.iter().map(|node| node.render_id().clone()).collect();
    ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    ids.dedup();
    assert_eq!(ids.len(), 5);
}

#[tokio::test]
async fn synchronous_failure_fails_render_and_logs_once() {
    let logger = RecordingLogger::new();
    let root = create_render_context(RenderOptions::new().with_logger(logger.clone()));

    let tree = fragment(vec![
        Renderable::from("before "),
        fragment(create_element(explode, None::<Children>, vec![])).into(),
    ]);

    let err = root.render(tree).await.unwrap_err();
    assert_eq!(err.to_string(), "Render failed: component exploded");

    let exceptions = logger.exceptions();
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].0, "explode");
    assert!(RenderError::same(&exceptions[0].1, &err));
}

#[tokio::test]
async fn failure_inside_async_component_is_logged_at_that_element() {
    fn late_failure(_props: &Children, _ctx: &RenderContext) -> airender::Result<Renderable> {
        Ok(Renderable::future(async {
            Err(RenderError::component(
                "late_failure",
                anyhow::anyhow!("backend unavailable"),
            ))
        }))
    }

    let logger = RecordingLogger::new();
    let root = create_render_context(RenderOptions::new().with_logger(logger.clone()));
    let tree = fragment(create_element(late_failure, None::<Children>, vec![]));

    let err = root.render(tree).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Component { .. }));

    let exceptions = logger.exceptions();
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].0, "late_failure");
}

#[tokio::test]
async fn stream_ends_after_first_error() {
    let tree = Renderable::stream(stream::iter(vec![
        Ok("kept".to_string()),
        Err(RenderError::other("stream broke")),
        Ok("dropped".to_string()),
    ]));

    let items: Vec<_> = ctx().render(tree).collect().await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_deref().unwrap(), "kept");
    assert!(items[1].is_err());
}

#[tokio::test]
async fn unrecognized_value_is_a_shape_error() {
    let err = Renderable::try_from_any(vec![1_u8, 2, 3]).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::UnexpectedRenderable { .. }));
    assert!(err.to_string().starts_with("Unexpected renderable type:"));
}

#[tokio::test]
async fn consumed_stream_cannot_be_rendered_twice() {
    let shared = words(&["once"], 0);
    let root = ctx();

    assert_eq!(root.render(shared.clone()).await.unwrap(), "once");
    let err = root.render(shared).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::UnexpectedRenderable { .. }));
}

#[tokio::test]
async fn future_resolution_is_shared_between_renders() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let future = Renderable::future(async move {
        counter.fetch_add(1, Ordering::SeqCst);
        sleep(Duration::from_millis(5)).await;
        Ok(Renderable::from("x"))
    });

    let root = ctx();
    let tree = Renderable::list([future.clone(), "-".into(), future.clone()]);
    assert_eq!(root.render(tree).await.unwrap(), "x-x");
    assert_eq!(root.render(future).await.unwrap(), "x");
    assert_eq!(runs.load(Ordering::SeqCst), 1, "the future body runs once");
}

#[tokio::test]
async fn component_repeating_future_children() {
    fn twice(props: &Children, _ctx: &RenderContext) -> airender::Result<Renderable> {
        Ok(Renderable::list([props.children.clone(), props.children.clone()]))
    }

    let child = Renderable::future(async { Ok(Renderable::from("echo ")) });
    let tree = create_element(twice, None::<Children>, vec![child]);
    assert_eq!(ctx().render(tree).await.unwrap(), "echo echo ");
}

#[tokio::test]
async fn panicking_list_item_fails_the_render() {
    fn buggy(_props: &Children, _ctx: &RenderContext) -> airender::Result<Renderable> {
        panic!("index out of range");
    }

    let logger = RecordingLogger::new();
    let root = create_render_context(RenderOptions::new().with_logger(logger.clone()));
    let tree = fragment(vec![
        Renderable::from(create_element(buggy, None::<Children>, vec![])),
        "tail".into(),
    ]);

    let outcome = timeout(Duration::from_secs(2), root.render(tree))
        .await
        .expect("render hung after a component panicked");
    let err = outcome.unwrap_err();
    assert!(err.to_string().contains("index out of range"));
    assert_eq!(logger.exceptions().len(), 1);
}

#[tokio::test]
async fn same_error_is_logged_once_per_render_call() {
    let cached = RenderError::other("cached failure");
    let failing = {
        let cached = cached.clone();
        Element::new(
            move |_props: &(), _ctx: &RenderContext| Err(cached.clone()),
            (),
        )
    };

    let logger = RecordingLogger::new();
    let root = create_render_context(RenderOptions::new().with_logger(logger.clone()));

    let first = root.render(fragment(failing.clone())).await.unwrap_err();
    let second = root.render(fragment(failing)).await.unwrap_err();
    assert!(RenderError::same(&first, &cached));
    assert!(RenderError::same(&second, &cached));

    let exceptions = logger.exceptions();
    assert_eq!(exceptions.len(), 2, "each failing render reports its error");
    assert!(exceptions.iter().all(|(_, error)| RenderError::same(error, &cached)));
}

#[tokio::test]
async fn nested_failure_inside_lists_is_logged_once_at_innermost_element() {
    fn fail_later(_props: &Children, _ctx: &RenderContext) -> airender::Result<Renderable> {
        Ok(Renderable::future(async {
            sleep(Duration::from_millis(5)).await;
            Err(RenderError::other("deep failure"))
        }))
    }

    let logger = RecordingLogger::new();
    let root = create_render_context(RenderOptions::new().with_logger(logger.clone()));

    let inner = fragment(vec![
        Renderable::from("b "),
        create_element(fail_later, None::<Children>, vec![]).into(),
        words(&["never"], 20),
    ]);
    let tree = fragment(vec![
        Renderable::from("a "),
        fragment(vec![Renderable::from(inner), "c".into()]).into(),
        fragment("sibling").into(),
    ]);

    let items: Vec<_> = root.render(tree).collect().await;
    let texts: Vec<&str> = items.iter().filter_map(|item| item.as_deref().ok()).collect();
    assert_eq!(texts, vec!["a ", "b "]);
    let err = items.last().unwrap().as_ref().unwrap_err();
    assert_eq!(err.to_string(), "Render failed: deep failure");

    let exceptions = logger.exceptions();
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].0, "fail_later");
    assert!(RenderError::same(&exceptions[0].1, err));
}

#[tokio::test]
async fn passthrough_is_transparent() {
    let tree = create_element(passthrough, None::<Children>, vec!["x".into(), "y".into()]);
    assert_eq!(airender::render(&ctx(), tree).await.unwrap(), "xy");
}

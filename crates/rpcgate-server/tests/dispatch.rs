//! End-to-end stream dispatch over the in-memory transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{CallCounter, LabelHandler, RecordingTracer, frame, next_finish, serve, transport};
use http::{HeaderMap, HeaderValue};
use parking_lot::Mutex;
use rpcgate_server::{
    BizError, Code, FaultPolicy, RpcError, RpcResult, ServerOption, Status, endpoint_fn,
};
use rpcgate_transport_traits::TransportProtocol;
use serde_json::{Value, json};

fn explode(message: &str) -> RpcResult<()> {
    panic!("{message}")
}

fn echo(counter: CallCounter) -> Arc<dyn rpcgate_server::Endpoint> {
    endpoint_fn(move |_ctx, mut args| {
        let counter = counter.clone();
        async move {
            counter.bump();
            while let Some(msg) = args.stream.recv_msg::<Value>().await? {
                args.stream.send_msg(&msg).await?;
            }
            Ok(())
        }
    })
}

#[tokio::test]
async fn test_echo_call_succeeds() {
    let (tr, client) = transport();
    let (tracer, mut finishes) = RecordingTracer::new(Arc::clone(&tr));
    let counter = CallCounter::default();
    let served = serve(
        tr,
        client,
        ServerOption::builder()
            .tracer(tracer)
            .invoke_handler(echo(counter.clone())),
    );

    let mut call = served.client().open_stream("/echo.EchoService/Echo");
    call.send(frame(&json!({"say": "hi"}))).unwrap();
    call.close_send();

    assert_eq!(call.recv().await, Some(frame(&json!({"say": "hi"}))));
    let status = call.status().await.unwrap();
    assert_eq!(status.code(), Code::Ok);
    assert_eq!(status.message(), "");

    let finished = next_finish(&mut finishes).await;
    assert_eq!(finished.seq_id, call.id());
    assert_eq!(
        (finished.package.as_str(), finished.service.as_str(), finished.method.as_str()),
        ("echo", "EchoService", "Echo")
    );
    assert!(finished.started);
    assert_eq!(finished.error, None);
    assert_eq!(finished.panicked, None);
    assert_eq!(finished.statuses_written, 1);
    assert_eq!(counter.get(), 1);

    assert_eq!(served.transport.statuses_for(call.id()).len(), 1);
    served.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_method_without_separator_is_rejected() {
    let (tr, client) = transport();
    let (tracer, mut finishes) = RecordingTracer::new(Arc::clone(&tr));
    let counter = CallCounter::default();
    let served = serve(
        tr,
        client,
        ServerOption::builder()
            .tracer(tracer)
            .invoke_handler(echo(counter.clone())),
    );

    let mut call = served.client().open_stream("BadMethod");
    let status = call.status().await.unwrap();
    assert_eq!(status.code(), Code::ResourceExhausted);
    assert!(status.message().contains("\"BadMethod\""), "{status}");

    let finished = next_finish(&mut finishes).await;
    assert!(finished.started);
    assert!(finished.error.is_some_and(|e| e.contains("malformed method name")));
    assert_eq!(finished.statuses_written, 1);
    assert_eq!(counter.get(), 0);
    served.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_method_without_package_is_rejected() {
    let (tr, client) = transport();
    let (tracer, mut finishes) = RecordingTracer::new(Arc::clone(&tr));
    let counter = CallCounter::default();
    let served = serve(
        tr,
        client,
        ServerOption::builder()
            .tracer(tracer)
            .invoke_handler(echo(counter.clone())),
    );

    let mut call = served.client().open_stream("/noservice/Method");
    let status = call.status().await.unwrap();
    assert_eq!(status.code(), Code::ResourceExhausted);
    assert!(
        status
            .message()
            .contains("malformed package and service name: \"/noservice/Method\""),
        "{status}"
    );

    let finished = next_finish(&mut finishes).await;
    assert_eq!(finished.package, "");
    assert_eq!(counter.get(), 0);
    served.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_handshake_skips_endpoint() {
    let (tr, client) = transport();
    let (tracer, mut finishes) = RecordingTracer::new(Arc::clone(&tr));
    let counter = CallCounter::default();
    let log = Arc::new(Mutex::new(Vec::new()));
    let served = serve(
        tr,
        client,
        ServerOption::builder()
            .meta_handler(Arc::new(LabelHandler {
                label: "auth",
                fail_with: Some(Status::permission_denied("no token")),
                log: Arc::clone(&log),
            }))
            .tracer(tracer)
            .invoke_handler(echo(counter.clone())),
    );

    let mut call = served.client().open_stream("/echo.EchoService/Echo");
    let status = call.status().await.unwrap();
    assert_eq!(status.code(), Code::PermissionDenied);
    assert_eq!(status.message(), "no token");

    let finished = next_finish(&mut finishes).await;
    assert!(!finished.started);
    assert!(finished.error.is_some());
    assert_eq!(finished.statuses_written, 1);
    assert_eq!(counter.get(), 0);
    assert_eq!(*log.lock(), vec!["auth"]);
    served.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_second_of_three_handlers_failing_stops_chain() {
    let (tr, client) = transport();
    let counter = CallCounter::default();
    let log = Arc::new(Mutex::new(Vec::new()));
    let handler = |label, fail_with| {
        Arc::new(LabelHandler {
            label,
            fail_with,
            log: Arc::clone(&log),
        })
    };
    let served = serve(
        tr,
        client,
        ServerOption::builder()
            .meta_handler(handler("first", None))
            .meta_handler(handler(
                "second",
                Some(Status::unauthenticated("expired")),
            ))
            .meta_handler(handler("third", None))
            .invoke_handler(echo(counter.clone())),
    );

    let mut call = served.client().open_stream("/echo.EchoService/Echo");
    let status = call.status().await.unwrap();
    assert_eq!(status.code(), Code::Unauthenticated);
    assert_eq!(status.message(), "expired");
    assert_eq!(*log.lock(), vec!["first", "second"]);
    assert_eq!(counter.get(), 0);
    served.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_endpoint_panic_is_contained_without_status() {
    let (tr, client) = transport();
    let (tracer, mut finishes) = RecordingTracer::new(Arc::clone(&tr));
    let served = serve(
        tr,
        client,
        ServerOption::builder()
            .tracer(tracer)
            .invoke_handler(endpoint_fn(|_ctx, _args| async move {
                explode("index out of bounds")
            })),
    );

    let call = served.client().open_stream("/echo.EchoService/Echo");
    let finished = next_finish(&mut finishes).await;
    assert_eq!(finished.seq_id, call.id());
    assert_eq!(finished.error, None);
    let fault = finished.panicked.expect("fault payload recorded");
    assert_eq!(fault.message, "index out of bounds");
    assert!(!fault.backtrace.is_empty());
    assert_eq!(finished.statuses_written, 0);

    assert!(served.transport.statuses_for(call.id()).is_empty());
    served.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_internal_status_policy_reports_panic() {
    let (tr, client) = transport();
    let (tracer, mut finishes) = RecordingTracer::new(Arc::clone(&tr));
    let served = serve(
        tr,
        client,
        ServerOption::builder()
            .tracer(tracer)
            .fault_policy(FaultPolicy::InternalStatus)
            .invoke_handler(endpoint_fn(|_ctx, _args| async move { explode("boom") })),
    );

    let mut call = served.client().open_stream("/echo.EchoService/Echo");
    let status = call.status().await.unwrap();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("boom"));

    let finished = next_finish(&mut finishes).await;
    assert_eq!(finished.statuses_written, 1);
    assert_eq!(finished.panicked.map(|p| p.message), Some("boom".into()));
    served.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_stream_does_not_disturb_siblings() {
    let (tr, client) = transport();
    let (tracer, mut finishes) = RecordingTracer::new(Arc::clone(&tr));
    let served = serve(
        tr,
        client,
        ServerOption::builder()
            .tracer(tracer)
            .invoke_handler(endpoint_fn(|ctx, mut args| async move {
                let method = ctx
                    .rpc_info()
                    .map(|info| info.invocation().method_name().to_string())
                    .unwrap_or_default();
                if method == "Crash" {
                    panic!("crash requested");
                }
                while let Some(msg) = args.stream.recv_msg::<Value>().await? {
                    args.stream.send_msg(&msg).await?;
                }
                Ok(())
            })),
    );

    let crash = served.client().open_stream("/echo.EchoService/Crash");
    let mut calls = Vec::new();
    for n in 0..8 {
        let call = served.client().open_stream("/echo.EchoService/Echo");
        call.send(frame(&json!({ "n": n }))).unwrap();
        call.close_send();
        calls.push(call);
    }

    for (n, mut call) in calls.into_iter().enumerate() {
        assert_eq!(call.recv().await, Some(frame(&json!({ "n": n }))));
        assert_eq!(call.status().await.unwrap().code(), Code::Ok);
    }

    let mut crashed = 0;
    for _ in 0..9 {
        let finished = next_finish(&mut finishes).await;
        if finished.seq_id == crash.id() {
            assert!(finished.panicked.is_some());
            crashed += 1;
        } else {
            assert!(finished.panicked.is_none());
        }
    }
    assert_eq!(crashed, 1);
    assert!(served.transport.statuses_for(crash.id()).is_empty());
    served.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_business_error_translated_with_message() {
    let (tr, client) = transport();
    let (tracer, mut finishes) = RecordingTracer::new(Arc::clone(&tr));
    let served = serve(
        tr,
        client,
        ServerOption::builder()
            .tracer(tracer)
            .invoke_handler(endpoint_fn(|_ctx, _args| async move {
                Err(RpcError::business(5, "user 42 not found"))
            })),
    );

    let mut call = served.client().open_stream("/users.UserService/Get");
    let status = call.status().await.unwrap();
    assert_eq!(status.code(), Code::NotFound);
    assert_eq!(status.message(), "user 42 not found");

    let finished = next_finish(&mut finishes).await;
    assert_eq!(finished.error.as_deref(), Some("biz error 5: user 42 not found"));
    assert_eq!(finished.statuses_written, 1);
    served.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_custom_error_mapper() {
    let (tr, client) = transport();
    let served = serve(
        tr,
        client,
        ServerOption::builder()
            .error_mapper(Arc::new(|_err: &BizError| Code::FailedPrecondition))
            .invoke_handler(endpoint_fn(|_ctx, _args| async move {
                Err(RpcError::business(1001, "quota reached"))
            })),
    );

    let mut call = served.client().open_stream("/billing.Billing/Charge");
    let status = call.status().await.unwrap();
    assert_eq!(status.code(), Code::FailedPrecondition);
    assert_eq!(status.message(), "quota reached");
    served.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_missing_endpoint_is_unimplemented() {
    let (tr, client) = transport();
    let served = serve(tr, client, ServerOption::builder());

    let mut call = served.client().open_stream("/echo.EchoService/Echo");
    assert_eq!(call.status().await.unwrap().code(), Code::Unimplemented);

    served
        .handler
        .set_invoke_handler(echo(CallCounter::default()));
    let mut call = served.client().open_stream("/echo.EchoService/Echo");
    call.close_send();
    assert_eq!(call.status().await.unwrap().code(), Code::Ok);
    served.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_endpoint_sees_call_state_and_headers() {
    let (tr, client) = transport();
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let served = serve(
        tr,
        client,
        ServerOption::builder().invoke_handler(endpoint_fn(move |ctx, args| {
            let sink = Arc::clone(&sink);
            async move {
                let info = ctx.rpc_info().expect("call state");
                *sink.lock() = Some((
                    info.invocation().seq_id(),
                    info.from().address(),
                    info.config().transport_protocol(),
                    args.stream
                        .headers()
                        .get("x-tenant")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string),
                    ctx.headers().contains_key("x-tenant"),
                ));
                Ok(())
            }
        })),
    );

    let mut headers = HeaderMap::new();
    headers.insert("x-tenant", HeaderValue::from_static("acme"));
    let mut call = served
        .client()
        .open_stream_with_headers("/echo.EchoService/Echo", headers);
    assert_eq!(call.status().await.unwrap().code(), Code::Ok);

    let (seq_id, from, protocol, tenant, in_ctx) = seen.lock().take().unwrap();
    assert_eq!(seq_id, call.id());
    assert_eq!(from, Some(common::remote()));
    assert_eq!(protocol, TransportProtocol::Grpc);
    assert_eq!(tenant.as_deref(), Some("acme"));
    assert!(in_ctx);
    served.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_call_states_are_recycled_with_reset_stats() {
    let (tr, client) = transport();
    let (tracer, mut finishes) = RecordingTracer::new(Arc::clone(&tr));
    let served = serve(
        tr,
        client,
        ServerOption::builder()
            .tracer(tracer)
            .pool_capacity(4)
            .invoke_handler(echo(CallCounter::default())),
    );

    for round in 0..3 {
        let mut call = served.client().open_stream("/echo.EchoService/Echo");
        call.send(frame(&json!({ "round": round }))).unwrap();
        call.close_send();
        assert_eq!(call.status().await.unwrap().code(), Code::Ok);

        let finished = next_finish(&mut finishes).await;
        assert_eq!(finished.recv_at_start, 0);
        common::wait_for_idle(&served.handler, 1).await;
        assert_eq!(served.handler.call_states().pool().idle(), 1);
    }
    served.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_streams_hold_distinct_call_states() {
    const STREAMS: usize = 4;
    const CAPACITY: usize = 2;

    let (tr, client) = transport();
    let barrier = Arc::new(tokio::sync::Barrier::new(STREAMS + 1));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let served = {
        let barrier = Arc::clone(&barrier);
        let seen = Arc::clone(&seen);
        serve(
            tr,
            client,
            ServerOption::builder()
                .pool_capacity(CAPACITY)
                .invoke_handler(endpoint_fn(move |ctx, _args| {
                    let barrier = Arc::clone(&barrier);
                    let seen = Arc::clone(&seen);
                    async move {
                        let info = ctx.rpc_info().expect("call state");
                        seen.lock().push(Arc::as_ptr(info) as usize);
                        barrier.wait().await;
                        Ok(())
                    }
                })),
        )
    };

    let calls: Vec<_> = (0..STREAMS)
        .map(|_| served.client().open_stream("/echo.EchoService/Echo"))
        .collect();
    tokio::time::timeout(Duration::from_secs(5), barrier.wait())
        .await
        .expect("all streams parked");

    let mut ptrs = seen.lock().clone();
    assert_eq!(ptrs.len(), STREAMS);
    ptrs.sort_unstable();
    ptrs.dedup();
    assert_eq!(ptrs.len(), STREAMS, "a call state was shared between streams");

    for mut call in calls {
        assert_eq!(call.status().await.unwrap().code(), Code::Ok);
    }
    common::wait_for_idle(&served.handler, STREAMS.min(CAPACITY)).await;
    assert_eq!(served.handler.call_states().pool().idle(), CAPACITY);
    served.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_call_state_recycled_after_panic() {
    let (tr, client) = transport();
    let served = serve(
        tr,
        client,
        ServerOption::builder().invoke_handler(endpoint_fn(|ctx, _args| async move {
            let method = ctx
                .rpc_info()
                .map(|info| info.invocation().method_name().to_string())
                .unwrap_or_default();
            if method == "Crash" {
                return explode("crash requested");
            }
            Ok(())
        })),
    );

    let crash = served.client().open_stream("/echo.EchoService/Crash");
    crash.close_send();
    common::wait_for_idle(&served.handler, 1).await;
    assert_eq!(served.handler.call_states().pool().idle(), 1);

    let mut call = served.client().open_stream("/echo.EchoService/Echo");
    assert_eq!(call.status().await.unwrap().code(), Code::Ok);
    drop(crash);
    served.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_oversized_request_is_resource_exhausted() {
    let (tr, client) = transport();
    let served = serve(
        tr,
        client,
        ServerOption::builder()
            .limits(rpcgate_transport_traits::LimitsConfig {
                max_recv_message_size: Some(8),
                max_send_message_size: None,
            })
            .invoke_handler(echo(CallCounter::default())),
    );

    let mut call = served.client().open_stream("/echo.EchoService/Echo");
    call.send(frame(&json!({"payload": "well over eight bytes"})))
        .unwrap();
    call.close_send();
    let status = tokio::time::timeout(Duration::from_secs(5), call.status())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.code(), Code::ResourceExhausted);
    served.shutdown().await.unwrap();
}

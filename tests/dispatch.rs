use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use jsonrpc_dispatch::{
    Dispatcher, DispatcherOptions, Error, ParamSpec, ParamType, RequestScope, Service,
    ServiceRegistry, bail,
};
use serde_json::{Value, json};
use tokio::test;

fn svc() -> Arc<Service> {
    Service::builder("svc")
        .method(
            "add",
            [
                ParamSpec::optional("a", ParamType::Int),
                ParamSpec::required("b", ParamType::Int),
            ],
            |_, args| Ok(args.get::<i64>(0)? + args.get::<i64>(1)?),
        )
        .method("pick", [ParamSpec::required("v", ParamType::Int)], |_, _| {
            Ok("int")
        })
        .method(
            "pick",
            [ParamSpec::required("v", ParamType::String)],
            |_, _| Ok("string"),
        )
        .method("nested", [], |_, _| {
            Ok(json!({"a": {"b": {"c": 1}}, "x": [1, [2]]}))
        })
        .method("nothing", [], |_, _| Ok(()))
        .method("fail", [], |_, _| -> jsonrpc_dispatch::Result<()> {
            bail!("boom")
        })
        .method("panic", [], |_, _| -> jsonrpc_dispatch::Result<()> {
            panic!("kaboom")
        })
        .method_async(
            "sleep",
            [ParamSpec::new("ms", ParamType::UInt)],
            |_, args| async move {
                let ms = args.get::<u64>(0)?;
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok::<_, Error>(ms)
            },
        )
        .build()
}

fn dispatcher() -> Dispatcher {
    Dispatcher::new(ServiceRegistry::new().with(svc()))
}

async fn send(d: &Dispatcher, request: Value) -> Result<(Option<Value>, u16)> {
    let reply = d.handle_value(request).await;
    let body = reply.body.map(serde_json::to_value).transpose()?;
    Ok((body, reply.http_status))
}

fn error_code(response: &Value) -> Option<i64> {
    response["error"]["code"].as_i64()
}

#[test]
async fn add_named() -> Result<()> {
    let (body, status) = send(
        &dispatcher(),
        json!({"jsonrpc": "2.0", "id": 1, "method": "svc#add", "params": {"a": 1, "b": 2}}),
    )
    .await?;
    assert_eq!(body, Some(json!({"jsonrpc": "2.0", "id": 1, "result": 3})));
    assert_eq!(status, 200);
    Ok(())
}

#[test]
async fn add_positional_matches_named() -> Result<()> {
    let d = dispatcher();
    let (named, _) = send(
        &d,
        json!({"jsonrpc": "2.0", "id": "x", "method": "svc#add", "params": {"a": 4, "b": 5}}),
    )
    .await?;
    let (positional, _) = send(
        &d,
        json!({"jsonrpc": "2.0", "id": "x", "method": "svc#add", "params": [4, 5]}),
    )
    .await?;
    assert_eq!(named, positional);
    Ok(())
}

#[test]
async fn optional_primitive_defaults_to_zero() -> Result<()> {
    let (body, _) = send(
        &dispatcher(),
        json!({"jsonrpc": "2.0", "id": 1, "method": "svc#add", "params": {"b": 5}}),
    )
    .await?;
    assert_eq!(body.map(|b| b["result"].clone()), Some(json!(5)));
    Ok(())
}

#[test]
async fn service_name_is_case_insensitive() -> Result<()> {
    let (body, _) = send(
        &dispatcher(),
        json!({"jsonrpc": "2.0", "id": 1, "method": " SVC #add", "params": [1, 1]}),
    )
    .await?;
    assert_eq!(body.map(|b| b["result"].clone()), Some(json!(2)));
    Ok(())
}

#[test]
async fn wrong_version_is_invalid_request() -> Result<()> {
    let (body, status) = send(
        &dispatcher(),
        json!({"jsonrpc": "1.0", "id": 1, "method": "svc#add", "params": [1, 2]}),
    )
    .await?;
    assert_eq!(
        body,
        Some(json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32600, "message": "Invalid Request"}}))
    );
    assert_eq!(status, 400);
    Ok(())
}

#[test]
async fn missing_method_and_scalar_params_are_invalid() -> Result<()> {
    let d = dispatcher();
    for request in [
        json!({"jsonrpc": "2.0", "id": 1}),
        json!({"jsonrpc": "2.0", "id": 1, "method": "svc#add", "params": 5}),
        json!({"jsonrpc": "2.0", "id": true, "method": "svc#add"}),
    ] {
        let (body, status) = send(&d, request.clone()).await?;
        let body = body.unwrap_or_default();
        assert_eq!(error_code(&body), Some(-32600), "{request}");
        assert_eq!(status, 400);
    }
    Ok(())
}

#[test]
async fn parse_error() -> Result<()> {
    let reply = dispatcher().handle_text(r#"{"jsonrpc": "2.0", "#).await;
    assert_eq!(reply.http_status, 400);
    assert_eq!(
        serde_json::from_str::<Value>(&reply.to_json_string()?)?,
        json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32700, "message": "Parse error"}})
    );
    Ok(())
}

#[test]
async fn empty_array_and_scalar_root_are_invalid() -> Result<()> {
    let d = dispatcher();
    for request in [json!([]), json!(3), json!(null), json!("x")] {
        let (body, status) = send(&d, request.clone()).await?;
        let body = body.unwrap_or_default();
        assert!(body.is_object(), "{request}");
        assert_eq!(error_code(&body), Some(-32600));
        assert_eq!(body["id"], Value::Null);
        assert_eq!(status, 400);
    }
    Ok(())
}

#[test]
async fn unknown_method() -> Result<()> {
    let d = dispatcher();
    for method in ["svc#missing", "nosvc#add", "svcadd", "svc#add#x"] {
        let (body, status) = send(
            &d,
            json!({"jsonrpc": "2.0", "id": 7, "method": method, "params": [1, 2]}),
        )
        .await?;
        let body = body.unwrap_or_default();
        assert_eq!(error_code(&body), Some(-32601), "{method}");
        assert_eq!(body["id"], json!(7));
        assert_eq!(status, 500);
    }
    Ok(())
}

#[test]
async fn method_not_found_status_is_configurable() -> Result<()> {
    let options: DispatcherOptions = serde_json::from_value(json!({"method_not_found_status": 404}))?;
    let d = dispatcher().with_options(options);
    let (_, status) = send(&d, json!({"jsonrpc": "2.0", "id": 1, "method": "svc#missing"})).await?;
    assert_eq!(status, 404);
    Ok(())
}

#[test]
async fn unmatched_params_are_method_not_found() -> Result<()> {
    let d = dispatcher();
    for params in [json!([1, 2, 3]), json!({"b": 1, "c": 2}), json!({"a": 1}), json!(["1", 2])] {
        let (body, _) = send(
            &d,
            json!({"jsonrpc": "2.0", "id": 1, "method": "svc#add", "params": params}),
        )
        .await?;
        assert_eq!(error_code(&body.unwrap_or_default()), Some(-32601), "{params}");
    }
    Ok(())
}

#[test]
async fn first_matching_overload_wins() -> Result<()> {
    let d = dispatcher();
    let (int, _) = send(
        &d,
        json!({"jsonrpc": "2.0", "id": 1, "method": "svc#pick", "params": [1]}),
    )
    .await?;
    let (string, _) = send(
        &d,
        json!({"jsonrpc": "2.0", "id": 1, "method": "svc#pick", "params": ["1"]}),
    )
    .await?;
    assert_eq!(int.map(|b| b["result"].clone()), Some(json!("int")));
    assert_eq!(string.map(|b| b["result"].clone()), Some(json!("string")));
    Ok(())
}

#[test]
async fn batch_with_notification() -> Result<()> {
    let (body, status) = send(
        &dispatcher(),
        json!([
            {"jsonrpc": "2.0", "id": 1, "method": "svc#add", "params": [1, 2]},
            {"jsonrpc": "2.0", "method": "svc#add", "params": [3, 4]},
            {"jsonrpc": "2.0", "id": 3, "method": "svc#missing"},
        ]),
    )
    .await?;
    let body = body.unwrap_or_default();
    let items = body.as_array().cloned().unwrap_or_default();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0], json!({"jsonrpc": "2.0", "id": 1, "result": 3}));
    assert_eq!(items[1]["id"], json!(3));
    assert_eq!(error_code(&items[1]), Some(-32601));
    assert_eq!(status, 500);
    Ok(())
}

#[test]
async fn single_element_batch_is_an_array() -> Result<()> {
    let (body, status) = send(
        &dispatcher(),
        json!([{"jsonrpc": "2.0", "id": 1, "method": "svc#add", "params": [1, 2]}]),
    )
    .await?;
    assert_eq!(body, Some(json!([{"jsonrpc": "2.0", "id": 1, "result": 3}])));
    assert_eq!(status, 200);
    Ok(())
}

#[test]
async fn notifications_are_suppressed() -> Result<()> {
    let d = dispatcher();
    let (body, status) = send(&d, json!({"jsonrpc": "2.0", "method": "svc#add", "params": [1, 2]})).await?;
    assert_eq!(body, None);
    assert_eq!(status, 200);

    let (body, status) = send(
        &d,
        json!([
            {"jsonrpc": "2.0", "method": "svc#add", "params": [1, 2]},
            {"jsonrpc": "2.0", "method": "svc#missing"},
            {"jsonrpc": "2.0", "method": "svc#fail"},
        ]),
    )
    .await?;
    assert_eq!(body, None);
    assert_eq!(status, 200);

    let reply = d.handle_text(r#"{"jsonrpc":"2.0","method":"svc#fail"}"#).await;
    assert!(reply.is_empty());
    assert_eq!(reply.to_json_string()?, "");
    Ok(())
}

#[test]
async fn null_id_is_not_a_notification() -> Result<()> {
    let d = dispatcher();
    let (body, status) = send(
        &d,
        json!({"jsonrpc": "2.0", "id": null, "method": "svc#add", "params": [1, 2]}),
    )
    .await?;
    assert_eq!(body, Some(json!({"jsonrpc": "2.0", "id": null, "result": 3})));
    assert_eq!(status, 200);

    let (body, status) = send(
        &d,
        json!([
            {"jsonrpc": "2.0", "id": null, "method": "svc#missing"},
            {"jsonrpc": "2.0", "method": "svc#missing"},
        ]),
    )
    .await?;
    let body = body.unwrap_or_default();
    assert_eq!(body.as_array().map(|a| a.len()), Some(1));
    assert_eq!(body[0]["id"], Value::Null);
    assert_eq!(error_code(&body[0]), Some(-32601));
    assert_eq!(status, 500);
    Ok(())
}

#[test]
async fn large_integer_id_is_echoed_exactly() -> Result<()> {
    let reply = dispatcher()
        .handle_text(r#"{"jsonrpc":"2.0","id":18446744073709551615,"method":"svc#add","params":[1,2]}"#)
        .await;
    assert_eq!(
        reply.to_json_string()?,
        r#"{"jsonrpc":"2.0","id":18446744073709551615,"result":3}"#
    );
    Ok(())
}

#[test]
async fn invalid_notification_is_not_suppressed() -> Result<()> {
    let (body, status) = send(
        &dispatcher(),
        json!([{"jsonrpc": "1.0", "method": "svc#add", "params": [1, 2]}]),
    )
    .await?;
    let body = body.unwrap_or_default();
    assert_eq!(body[0]["id"], Value::Null);
    assert_eq!(error_code(&body[0]), Some(-32600));
    assert_eq!(status, 400);
    Ok(())
}

#[test]
async fn batch_non_object_element() -> Result<()> {
    let (body, status) = send(
        &dispatcher(),
        json!([1, {"jsonrpc": "2.0", "id": 2, "method": "svc#add", "params": [1, 1]}]),
    )
    .await?;
    let body = body.unwrap_or_default();
    assert_eq!(error_code(&body[0]), Some(-32600));
    assert_eq!(body[0]["id"], Value::Null);
    assert_eq!(body[1]["result"], json!(2));
    assert_eq!(status, 400);
    Ok(())
}

#[test]
async fn null_result() -> Result<()> {
    let (body, _) = send(&dispatcher(), json!({"jsonrpc": "2.0", "id": 1, "method": "svc#nothing"})).await?;
    assert_eq!(body, Some(json!({"jsonrpc": "2.0", "id": 1, "result": null})));
    Ok(())
}

#[test]
async fn failure_is_internal_error() -> Result<()> {
    let (body, status) = send(&dispatcher(), json!({"jsonrpc": "2.0", "id": 1, "method": "svc#fail"})).await?;
    assert_eq!(
        body,
        Some(json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32603, "message": "boom"}}))
    );
    assert_eq!(status, 500);
    Ok(())
}

#[test]
async fn panic_is_isolated() -> Result<()> {
    let (body, status) = send(
        &dispatcher(),
        json!([
            {"jsonrpc": "2.0", "id": 1, "method": "svc#panic"},
            {"jsonrpc": "2.0", "id": 2, "method": "svc#add", "params": [1, 1]},
        ]),
    )
    .await?;
    let body = body.unwrap_or_default();
    assert_eq!(error_code(&body[0]), Some(-32603));
    assert!(body[0]["error"]["message"].as_str().unwrap_or_default().contains("kaboom"));
    assert_eq!(body[1]["result"], json!(2));
    assert_eq!(status, 500);
    Ok(())
}

#[test]
async fn depth_management_param() -> Result<()> {
    let d = dispatcher();
    let (body, _) = send(
        &d,
        json!({"jsonrpc": "2.0", "id": 1, "method": "svc#nested", "params": {"#deep": 1}}),
    )
    .await?;
    assert_eq!(body.map(|b| b["result"].clone()), Some(json!({"a": null, "x": null})));

    let (body, _) = send(
        &d,
        json!({"jsonrpc": "2.0", "id": 1, "method": "svc#nested", "params": {"#deep": 2, ".trace": true}}),
    )
    .await?;
    assert_eq!(
        body.map(|b| b["result"].clone()),
        Some(json!({"a": {"b": null}, "x": [1, null]}))
    );

    let (body, _) = send(
        &d,
        json!({"jsonrpc": "2.0", "id": 1, "method": "svc#nested", "params": {"#deep": 0}}),
    )
    .await?;
    assert_eq!(
        body.map(|b| b["result"].clone()),
        Some(json!({"a": {"b": {"c": 1}}, "x": [1, [2]]}))
    );
    Ok(())
}

#[test]
async fn default_depth_option() -> Result<()> {
    let d = dispatcher().with_options(DispatcherOptions {
        default_depth: 1,
        ..DispatcherOptions::default()
    });
    let (body, _) = send(&d, json!({"jsonrpc": "2.0", "id": 1, "method": "svc#nested"})).await?;
    assert_eq!(body.map(|b| b["result"].clone()), Some(json!({"a": null, "x": null})));
    Ok(())
}

#[test]
async fn concurrent_batch_keeps_order() -> Result<()> {
    let d = dispatcher().with_options(DispatcherOptions {
        concurrent_batch: true,
        ..DispatcherOptions::default()
    });
    let (body, _) = send(
        &d,
        json!([
            {"jsonrpc": "2.0", "id": 1, "method": "svc#sleep", "params": [50]},
            {"jsonrpc": "2.0", "id": 2, "method": "svc#sleep", "params": [0]},
        ]),
    )
    .await?;
    let body = body.unwrap_or_default();
    assert_eq!(body[0]["id"], json!(1));
    assert_eq!(body[0]["result"], json!(50));
    assert_eq!(body[1]["id"], json!(2));
    Ok(())
}

#[test]
async fn release_callbacks_run_once_per_payload() -> Result<()> {
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    let svc = Service::builder("scope")
        .method("touch", [], move |cx, _| {
            let counter = counter.clone();
            cx.on_release(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            Ok(cx.method().to_string())
        })
        .method("fail", [], |cx, _| -> jsonrpc_dispatch::Result<()> {
            let token = cx.scope().get::<String>();
            bail!("token {}", token.as_deref().map_or("none", |s| s.as_str()))
        })
        .build();
    let d = Dispatcher::new(ServiceRegistry::new().with(svc));

    let (body, _) = send(
        &d,
        json!([
            {"jsonrpc": "2.0", "id": 1, "method": "scope#touch"},
            {"jsonrpc": "2.0", "id": 2, "method": "scope#touch"},
        ]),
    )
    .await?;
    assert_eq!(body.unwrap_or_default()[0]["result"], json!("scope#touch"));
    assert_eq!(released.load(Ordering::SeqCst), 2);

    let scope = RequestScope::new();
    scope.insert(String::from("abc"));
    let reply = d
        .handle_text_in(r#"{"jsonrpc":"2.0","id":1,"method":"scope#fail"}"#, scope.clone())
        .await;
    assert!(reply.to_json_string()?.contains("token abc"));
    assert!(scope.is_released());
    Ok(())
}

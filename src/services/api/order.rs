use {
    crate::{
        catalog::Catalog,
        logger::RequestId,
        order_log::{LogRecord, OrderLog, Params},
        purchase::{Outcome, PurchaseRequest, CONTENT_TYPE},
    },
    super::form::FormParams,
    actix_web::{route, web, HttpResponse},
    chrono::Local,
};

/// Purchase endpoint polled by the store client.
///
/// Everything is free, so a known product with a download URL is always
/// "purchased". Unparseable query strings or bodies count as empty; see
/// [`FormParams`] for the accepted body encodings.
#[route("/appmallpipeorder.php", method = "GET", method = "POST")]
pub async fn order(
    request_id: RequestId,
    catalog: web::Data<Catalog>,
    order_log: web::Data<dyn OrderLog>,
    query: Option<web::Query<Params>>,
    form: FormParams,
) -> HttpResponse {
    let query = query.map(web::Query::into_inner).unwrap_or_default();
    let form = form.into_inner();

    let request = PurchaseRequest::from_params(&query, &form);

    order_log.append(&LogRecord {
        timestamp: Local::now(),
        product_id: &request.product_id,
        email: &request.email,
        query: &query,
        form: &form,
    });

    let outcome = Outcome::resolve(&catalog, &request);

    tracing::info!(
        %request_id,
        product_id = %request.product_id,
        purchased = outcome.is_purchased(),
        "order processed"
    );

    match outcome.to_xml() {
        Ok(body) => HttpResponse::Ok().content_type(CONTENT_TYPE).body(body),
        Err(error) => {
            tracing::error!(%request_id, %error, "order response not rendered");

            HttpResponse::InternalServerError().finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        crate::{
            catalog::{tests::entry, Catalog},
            logger::TracingLogger,
            order_log::{FileOrderLog, NullOrderLog, OrderLog},
            purchase::{
                tests::{assert_well_formed, assert_xml_chars},
                CONTENT_TYPE,
            },
            services,
        },
        actix_web::{
            http::{header, StatusCode},
            test, web, App,
        },
        std::{fs, sync::Arc},
    };

    const PATH: &str = "/api/appmallpipeorder.php";

    fn catalog() -> Catalog {
        Catalog::from_entries(vec![
            entry("100", Some("com.example.maps"), Some("https://cdn.example.com/maps.apk")),
            entry("200", Some("com.example.mail"), Some("https://cdn.example.com/mail.apk?v=2&lang=en")),
            entry("300", Some("com.example.retired"), None),
        ])
    }

    macro_rules! app {
        ($order_log:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(catalog()))
                    .app_data(web::Data::<dyn OrderLog>::from($order_log))
                    .service(services::api())
                    .wrap(TracingLogger),
            )
            .await
        };
    }

    async fn call(req: test::TestRequest) -> (StatusCode, String, String) {
        call_with(Arc::new(NullOrderLog), req).await
    }

    async fn call_with(order_log: Arc<dyn OrderLog>, req: test::TestRequest) -> (StatusCode, String, String) {
        let app = app!(order_log);
        let res = test::call_service(&app, req.to_request()).await;

        let status = res.status();
        let content_type = res
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = String::from_utf8(test::read_body(res).await.to_vec()).unwrap();

        (status, content_type, body)
    }

    #[actix_web::test]
    async fn get_known_product() {
        let (status, content_type, body) =
            call(test::TestRequest::get().uri(&format!("{}?pid=100", PATH))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, CONTENT_TYPE);
        assert_well_formed(&body);
        assert!(body.contains("<status>OK</status>"));
        assert!(body.contains("<downloadURL>https://cdn.example.com/maps.apk</downloadURL>"));
        assert!(body.contains("<productId>100</productId>"));
    }

    #[actix_web::test]
    async fn every_downloadable_entry_can_be_purchased() {
        let app = app!(Arc::new(NullOrderLog) as Arc<dyn OrderLog>);
        let catalog = catalog();

        let downloadable = catalog
            .entries()
            .iter()
            .filter_map(|entry| entry.download_url().map(|url| (entry, url)))
            .collect::<Vec<_>>();
        assert!(!downloadable.is_empty());

        for (entry, url) in downloadable {
            let req = test::TestRequest::get()
                .uri(&format!("{}?pid={}", PATH, entry.id))
                .to_request();
            let body = test::read_body(test::call_service(&app, req).await).await;
            let body = std::str::from_utf8(&body).unwrap();

            assert!(body.contains("<status>OK</status>"), "{}", body);
            assert!(
                body.contains(&format!("<downloadURL>{}</downloadURL>", url.replace('&', "&amp;"))),
                "{}",
                body
            );
        }
    }

    #[actix_web::test]
    async fn package_name_lookup() {
        let (_, _, body) =
            call(test::TestRequest::get().uri(&format!("{}?Pid=com.example.mail", PATH))).await;

        assert!(body.contains("<status>OK</status>"));
        assert!(body.contains("<productId>200</productId>"));
    }

    #[actix_web::test]
    async fn form_body_beats_query() {
        let req = test::TestRequest::post()
            .uri(&format!("{}?pid=200", PATH))
            .set_form(&[("pid", "100")]);

        let (status, _, body) = call(req).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<productId>100</productId>"));
    }

    #[actix_web::test]
    async fn lowercase_query_beats_capitalized_form() {
        let req = test::TestRequest::post()
            .uri(&format!("{}?pid=200", PATH))
            .set_form(&[("Pid", "100")]);

        let (_, _, body) = call(req).await;

        assert!(body.contains("<productId>200</productId>"));
    }

    #[actix_web::test]
    async fn multipart_body_is_read() {
        let body = "--B\r\n\
                    Content-Disposition: form-data; name=\"pid\"\r\n\r\n\
                    100\r\n\
                    --B--\r\n";
        let req = test::TestRequest::post()
            .uri(&format!("{}?pid=200", PATH))
            .insert_header((header::CONTENT_TYPE, "multipart/form-data; boundary=B"))
            .set_payload(body);

        let (status, _, body) = call(req).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<productId>100</productId>"), "{}", body);
    }

    #[actix_web::test]
    async fn non_form_body_is_ignored() {
        let req = test::TestRequest::post()
            .uri(&format!("{}?pid=100", PATH))
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload(r#"{"pid":"200"}"#);

        let (status, _, body) = call(req).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<productId>100</productId>"));
    }

    #[actix_web::test]
    async fn unknown_product() {
        let (status, content_type, body) =
            call(test::TestRequest::get().uri(&format!("{}?pid=999", PATH))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, CONTENT_TYPE);
        assert!(body.contains("<status>Error</status>"));
        assert!(body.contains("Product not found: 999"));
    }

    #[actix_web::test]
    async fn product_without_download_url() {
        let (status, _, body) = call(test::TestRequest::get().uri(&format!("{}?pid=300", PATH))).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<status>Error</status>"));
        assert!(!body.contains("downloadURL"));
    }

    #[actix_web::test]
    async fn missing_product_id() {
        let (status, _, body) = call(test::TestRequest::get().uri(PATH)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<status>Error</status>"));
    }

    #[actix_web::test]
    async fn special_characters_are_escaped() {
        let req = test::TestRequest::post()
            .uri(PATH)
            .set_form(&[("pid", "<x>&y"), ("email", "a<b>&c@example.com")]);

        let (status, _, body) = call(req).await;

        assert_eq!(status, StatusCode::OK);
        assert_well_formed(&body);
        assert!(body.contains("Product not found: &lt;x"));
        assert!(body.contains("&amp;y"));
    }

    #[actix_web::test]
    async fn order_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.log");

        let req = test::TestRequest::post()
            .uri(&format!("{}?pid=200", PATH))
            .set_form(&[("pid", "100"), ("email", "user@example.com")]);

        let (status, _, _) = call_with(Arc::new(FileOrderLog::new(&path)), req).await;
        assert_eq!(status, StatusCode::OK);

        let contents = fs::read_to_string(&path).unwrap();
        let line = contents.lines().next().unwrap();

        assert!(line.contains("| PID: 100 | Email: user@example.com |"), "{}", line);
        assert!(line.contains(r#"| GET: {"pid":"200"} |"#), "{}", line);
        assert!(line.ends_with(r#"| POST: {"email":"user@example.com","pid":"100"}"#), "{}", line);
    }

    #[actix_web::test]
    async fn newline_in_product_id_stays_on_one_log_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.log");

        let req = test::TestRequest::get().uri(&format!(
            "{}?pid=x%0A2020-01-01%2000:00:00%20%7C%20PID:%20forged",
            PATH
        ));

        let (status, _, body) = call_with(Arc::new(FileOrderLog::new(&path)), req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<status>Error</status>"));

        let contents = fs::read_to_string(&path).unwrap();

        assert_eq!(contents.lines().count(), 1, "{}", contents);
        assert!(!contents.lines().any(|line| line.starts_with("2020-01-01")));
    }

    #[actix_web::test]
    async fn control_characters_never_reach_the_document() {
        let (status, _, body) = call(test::TestRequest::get().uri(&format!("{}?pid=a%01b%0Cc", PATH))).await;

        assert_eq!(status, StatusCode::OK);
        assert_well_formed(&body);
        assert_xml_chars(&body);
        assert!(body.contains("Product not found: a\u{fffd}b\u{fffd}c"));
    }

    #[actix_web::test]
    async fn log_failure_does_not_change_response() {
        let dir = tempfile::tempdir().unwrap();
        let broken: Arc<dyn OrderLog> = Arc::new(FileOrderLog::new(dir.path()));

        let uri = format!("{}?pid=100", PATH);
        let expected = call(test::TestRequest::get().uri(&uri)).await;
        let actual = call_with(broken, test::TestRequest::get().uri(&uri)).await;

        assert_eq!(actual, expected);
    }
}

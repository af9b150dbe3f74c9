use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dumb_server::application::FixedResponder;
use dumb_server::domain::response_spec::{parse_response, ResponseSpec};
use dumb_server::infrastructure::server_impl::request::parse_head;
use dumb_server::infrastructure::server_impl::response::encode;
use http::{Request, StatusCode};
use httparse::ParserConfig;

const SAMPLE: &[u8] = b"GET /somepath HTTP/1.1\nHost: ifconfig.me\nUser-Agent: curl/8.5.0\nAccept: */*\nContent-Type: text/html; charset=ISO-8859-4\r\n\r\n";

const RESPONSE_SPEC: &str = "Content-Type:application/json\nCache-Control:no-store\nSet-Cookie:a=1\nSet-Cookie:b=2\n\n{\"status\": \"ok\"}\n{\"more\": true}";

const DATE: &str = "Sun, 06 Nov 1994 08:49:37 GMT";

fn bench_http_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("http_parse");

    group.bench_function(BenchmarkId::new("Request head", "sample http"), |c| {
        c.iter(|| parse_head(black_box(SAMPLE), 1 << 20))
    });
    group.bench_function(BenchmarkId::new("HTTP parse", "sample http"), |c| {
        c.iter(move || {
            let mut headers = [httparse::EMPTY_HEADER; 8];
            let mut req = httparse::Request::new(&mut headers);
            ParserConfig::default()
                .parse_request(black_box(&mut req), black_box(SAMPLE))
                .unwrap();
            assert_eq!(req.path, Some("/somepath"));
        })
    });
    group.bench_function(BenchmarkId::new("Response spec", "json spec"), |c| {
        c.iter(|| parse_response(black_box(RESPONSE_SPEC.as_bytes())).unwrap())
    });
}

fn bench_http_response_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_build");

    let spec = ResponseSpec::from_reader(StatusCode::OK, RESPONSE_SPEC.as_bytes()).unwrap();
    let responder = FixedResponder::new(spec);
    let request = Request::new(());

    group.bench_function(BenchmarkId::new("Fixed response", "json spec"), |c| {
        c.iter(|| {
            let response = responder.respond(black_box(&request));
            encode(black_box(&response), false, true, DATE)
        })
    });
}

criterion_group!(http_parse, bench_http_parsing);
criterion_group!(http_response, bench_http_response_build);

criterion_main!(http_parse, http_response);

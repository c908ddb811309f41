use std::collections::HashMap;
use std::hint::black_box;

use cloudhttp::HttpRequest;
use cloudhttp::uris::{DEFAULT_PATH_SKIPS, UriBuilder, expand, url_encode};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

fn variables() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("endpoint", "vcloud.example.com"),
        ("org", "engineering"),
        ("vdc", "vdc-7f3a"),
        ("vapp", "vapp with spaces"),
    ])
}

fn bench_template_expansion(c: &mut Criterion) {
    let variables = variables();
    let builder = UriBuilder::new("https://{endpoint}/api/org/{org}/vdc/{vdc}/vApp/{vapp}?expand=true")
        .expect("template should parse");

    let mut group = c.benchmark_group("template_expansion");
    group.bench_function("expand_string", |b| {
        b.iter(|| {
            black_box(expand(
                black_box("/api/org/{org}/vdc/{vdc}/vApp/{vapp}"),
                &variables,
            ))
        });
    });
    group.bench_function("build_url", |b| {
        b.iter(|| black_box(builder.build_with(&variables).expect("url should build")));
    });
    group.finish();
}

fn bench_path_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_encoding");
    for segments in [1_usize, 8, 32] {
        let path = "/catalog/item;version=2/ünïcode name".repeat(segments);
        group.bench_with_input(BenchmarkId::from_parameter(segments), &path, |b, path| {
            b.iter(|| black_box(url_encode(black_box(path), &DEFAULT_PATH_SKIPS)));
        });
    }
    group.finish();
}

fn bench_query_mutation(c: &mut Criterion) {
    let request = HttpRequest::get("https://elb.example.com/?Action=DescribeLoadBalancers&Version=2012-06-01")
        .expect("request should build");

    let mut group = c.benchmark_group("query_mutation");
    group.bench_function("replace_and_add", |b| {
        b.iter(|| {
            let request = request
                .to_builder()
                .replace_query_param("Action", "RegisterInstancesWithLoadBalancer")
                .add_query_param("Instances.member.1", "i-6055fa09")
                .add_query_param("Instances.member.2", "i-9055fa55")
                .build()
                .expect("request should build");
            black_box(request)
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_template_expansion,
    bench_path_encoding,
    bench_query_mutation
);
criterion_main!(benches);

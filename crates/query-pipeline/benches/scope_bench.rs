//! 스코프 판정 벤치마크
//!
//! 기본 스코프 판정과 그룹 수에 따른 스케일링, 버퍼 적재 성능을 측정합니다.

use std::net::{IpAddr, Ipv4Addr};

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use dnswatch_core::types::Query;
use dnswatch_query_pipeline::{QueryBuffer, ScopeLoader, ScopeResolver};

fn scope_with_groups(n: usize) -> ScopeResolver {
    let mut yaml = String::from("groups:\n");
    for i in 0..n {
        yaml.push_str(&format!(
            "  g{i}:\n    networks: [\"10.{}.0.0/16\"]\n    exclude:\n      networks: [\"10.{}.0.1\"]\n      domains: [\"*.local\", \"*.lan\", \"printer{i}.corp\"]\n",
            i % 256,
            i % 256
        ));
    }
    ScopeLoader::parse(&yaml).unwrap()
}

fn bench_default_scope(c: &mut Criterion) {
    let resolver = ScopeLoader::default_scope().unwrap();
    let in_scope: IpAddr = "10.1.2.3".parse().unwrap();
    let outside: IpAddr = "8.8.8.8".parse().unwrap();
    let v6: IpAddr = "fd00::1".parse().unwrap();

    let mut group = c.benchmark_group("default_scope");
    group.bench_function("in_scope", |b| {
        b.iter(|| resolver.is_in_scope(black_box(in_scope), black_box("www.example.com")))
    });
    group.bench_function("excluded_domain", |b| {
        b.iter(|| resolver.is_in_scope(black_box(in_scope), black_box("nas.local")))
    });
    group.bench_function("no_matching_network", |b| {
        b.iter(|| resolver.is_in_scope(black_box(outside), black_box("www.example.com")))
    });
    group.bench_function("ipv6", |b| {
        b.iter(|| resolver.is_in_scope(black_box(v6), black_box("www.example.com")))
    });
    group.bench_function("needs_normalization", |b| {
        b.iter(|| resolver.is_in_scope(black_box(in_scope), black_box("WWW.Example.COM.")))
    });
    group.finish();
}

fn bench_group_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("scope_group_scaling");
    for n in [1usize, 10, 100, 500] {
        let resolver = scope_with_groups(n);
        // 마지막 그룹에만 속하는 주소 (최악의 경우)
        let ip = IpAddr::V4(Ipv4Addr::new(10, ((n - 1) % 256) as u8, 7, 7));
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(n), &resolver, |b, r| {
            b.iter(|| r.is_in_scope(black_box(ip), black_box("api.example.com")))
        });
    }
    group.finish();
}

fn bench_buffer_push(c: &mut Criterion) {
    let query = Query::new(
        chrono::Utc::now(),
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        "A",
        "www.example.com",
    );

    let mut group = c.benchmark_group("query_buffer");
    group.throughput(Throughput::Elements(1000));
    group.bench_function("push_1000_then_swap", |b| {
        let buffer = QueryBuffer::new(65_535);
        b.iter(|| {
            for _ in 0..1000 {
                buffer.push(query.clone());
            }
            black_box(buffer.swap_and_drain())
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_default_scope,
    bench_group_scaling,
    bench_buffer_push
);
criterion_main!(benches);

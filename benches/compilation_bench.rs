//! Compilation and rendering performance benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ptlc::*;

const SIMPLE: &str = r#"
<CenteredBox width="normal">
  <ProfilePhoto size="lg" shape="circle" />
  <DisplayName />
  <UserHandle />
  <Bio />
</CenteredBox>
"#;

const INTERACTIVE: &str = r#"
<Var name="count" type="number" initial="0" />
<Var name="open" type="boolean" initial="false" />
<FlexColumn gap="md" align="start">
  <Heading level="2">Guestbook</Heading>
  <p>Signed {$vars.count} times</p>
  <Button label="Sign"><OnClick><Increment var="count" /></OnClick></Button>
  <Show when="$vars.open"><Guestbook limit="10" /></Show>
  <Button label="Entries"><OnClick><Toggle var="open" /></OnClick></Button>
</FlexColumn>
"#;

fn bench_simple_compilation(c: &mut Criterion) {
    c.bench_function("simple_compilation", |b| {
        b.iter(|| compile_source(black_box(SIMPLE)).unwrap())
    });
}

fn bench_interactive_compilation(c: &mut Criterion) {
    c.bench_function("interactive_compilation", |b| {
        b.iter(|| compile_source(black_box(INTERACTIVE)).unwrap())
    });
}

fn bench_large_template_compilation(c: &mut Criterion) {
    let mut content = String::from("<FlexColumn gap=\"sm\" align=\"start\">\n");
    for i in 0..1000 {
        content.push_str(&format!("<p>Item {} by {{owner.handle}}</p>\n", i));
    }
    content.push_str("</FlexColumn>");

    let options = CompilerOptions {
        max_source_len: 1024 * 1024,
        ..Default::default()
    };

    c.bench_function("large_template_compilation", |b| {
        b.iter(|| compile_source_with_options(black_box(&content), black_box(&options)).unwrap())
    });
}

fn bench_full_render(c: &mut Criterion) {
    let template = compile_source(INTERACTIVE).unwrap();
    let ctx = DataContext::new(OwnerProfile {
        id: "u1".into(),
        handle: "maple".into(),
        display_name: "Maple".into(),
        bio: "gardener".into(),
        avatar_url: None,
    });
    let instance = TemplateInstance::new(template, ctx).unwrap();

    c.bench_function("full_render", |b| {
        b.iter(|| black_box(instance.render().unwrap()))
    });
}

fn bench_dispatch_and_patch(c: &mut Criterion) {
    let template = compile_source(INTERACTIVE).unwrap();
    let ctx = DataContext::new(OwnerProfile {
        id: "u1".into(),
        handle: "maple".into(),
        display_name: "Maple".into(),
        bio: String::new(),
        avatar_url: None,
    });
    let mut instance = TemplateInstance::new(template, ctx).unwrap();

    c.bench_function("dispatch_and_patch", |b| {
        b.iter(|| black_box(instance.dispatch(0).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_simple_compilation,
    bench_interactive_compilation,
    bench_large_template_compilation,
    bench_full_render,
    bench_dispatch_and_patch
);

criterion_main!(benches);

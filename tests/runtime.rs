//! Runtime tests: whole templates rendered through the bytecode back end,
//! mirrored against the C back end where the output shape can be checked.

use std::collections::BTreeMap;
use tarragon::{Data, Modifier, RuntimeError, Template, VariantValue};

fn render(template: &str, data: &Data) -> String {
    Template::new(template).unwrap().process(data).unwrap()
}

fn list_0_to_4() -> VariantValue {
    vec![0, 1, 2, 3, 4].into()
}

#[test]
fn foreach_over_list() {
    let mut data = Data::new();
    data.assign("list", list_0_to_4());
    let output = render("{foreach $item in $list}item: {$item}\n{/foreach}", &data);
    assert_eq!(output, "item: 0\nitem: 1\nitem: 2\nitem: 3\nitem: 4\n");
}

#[test]
fn foreach_with_keys() {
    let mut map = BTreeMap::new();
    for i in 1..=5 {
        map.insert(i.to_string(), VariantValue::from(i));
    }
    let mut data = Data::new();
    data.assign("map", map);
    let output = render(
        "{foreach $map as $value => $key}key: {$key}\nvalue: {$value}{/foreach}",
        &data,
    );
    assert_eq!(
        output,
        "key: 1\nvalue: 1key: 2\nvalue: 2key: 3\nvalue: 3key: 4\nvalue: 4key: 5\nvalue: 5"
    );
}

#[test]
fn foreachelse_runs_once_for_empty_sources() {
    let mut data = Data::new();
    data.assign("empty", Vec::<i64>::new());
    let output = render(
        "{foreach $item in $empty}item{foreachelse}nothing{/foreach}",
        &data,
    );
    assert_eq!(output, "nothing");

    // and not at all when there are members
    data.assign("empty", vec![1]);
    let output = render(
        "{foreach $item in $empty}item{foreachelse}nothing{/foreach}",
        &data,
    );
    assert_eq!(output, "item");
}

#[test]
fn if_else() {
    assert_eq!(render("{if true}true{else}false{/if}", &Data::new()), "true");
    assert_eq!(
        render("{if false}true{else}false{/if}", &Data::new()),
        "false"
    );
}

#[test]
fn if_elseif_against_missing_variables() {
    let template = Template::new("{if $var}true{elseif $var1}false{/if}").unwrap();

    let mut data1 = Data::new();
    data1.assign("var", true);
    let mut data2 = Data::new();
    data2.assign("var1", true);

    assert_eq!(template.process(&Data::new()).unwrap(), "");
    assert_eq!(template.process(&data1).unwrap(), "true");
    assert_eq!(template.process(&data2).unwrap(), "false");
}

#[test]
fn string_comparison() {
    assert_eq!(
        render("{if \"string1\" == \"string2\"}true{else}false{/if}", &Data::new()),
        "false"
    );
    assert_eq!(
        render("{if \"string1\" != \"string2\"}true{else}false{/if}", &Data::new()),
        "true"
    );
}

#[test]
fn numeric_and_boolean_comparison() {
    assert_eq!(render("{if 1 == 1}true{else}false{/if}", &Data::new()), "true");
    assert_eq!(
        render("{if true == true}true{else}false{/if}", &Data::new()),
        "true"
    );
    assert_eq!(render("{if 2 > 1 && 1 <= 1}yes{/if}", &Data::new()), "yes");
}

#[test]
fn assigning() {
    assert_eq!(render("{$var}-{$var=1}-{$var}", &Data::new()), "--1");
}

#[test]
fn assign_to_form() {
    assert_eq!(
        render("{assign 3 * 4 to $area}{$area}", &Data::new()),
        "12"
    );
}

#[test]
fn assignment_survives_the_loop() {
    let mut data = Data::new();
    data.assign("list", list_0_to_4());
    let output = render("{foreach $list as $item}{$o=$item}{/foreach}{$o}", &data);
    assert_eq!(output, "4");
}

#[test]
fn loop_binding_is_removed_after_the_loop() {
    let mut data = Data::new();
    data.assign("list", list_0_to_4());
    let output = render("{foreach $item in $list}{/foreach}[{$item}]", &data);
    assert_eq!(output, "[]");
}

#[test]
fn array_access() {
    let mut data = Data::new();
    data.assign("list", list_0_to_4());
    assert_eq!(render("{$list[3]}", &data), "3");
}

#[test]
fn key_array_access() {
    let mut map = BTreeMap::new();
    map.insert("key".to_string(), VariantValue::from("test"));
    let mut data = Data::new();
    data.assign("map", map);
    assert_eq!(render("{$map[\"key\"]}", &data), "test");
}

#[test]
fn dynamic_subscript() {
    let mut map = BTreeMap::new();
    map.insert("a".to_string(), VariantValue::from(10));
    let mut data = Data::new();
    data.assign("map", map);
    data.assign("which", "a");
    data.assign("list", list_0_to_4());
    data.assign("i", 2);
    assert_eq!(render("{$map[$which]} {$list[$i]}", &data), "10 2");
}

#[test]
fn member_path() {
    let mut inner = BTreeMap::new();
    inner.insert("name".to_string(), VariantValue::from("emiel"));
    let mut outer = BTreeMap::new();
    outer.insert("user".to_string(), VariantValue::from(inner));
    let mut data = Data::new();
    data.assign("page", outer);
    assert_eq!(render("{$page.user.name}", &data), "emiel");
}

#[test]
fn missing_variables_render_empty() {
    assert_eq!(render("[{$missing}][{$a.b.c}]", &Data::new()), "[][]");
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let template = Template::new("{1/0}").unwrap();
    let err = template.process(&Data::new()).unwrap_err();
    let runtime = err.downcast_ref::<RuntimeError>().unwrap();
    assert_eq!(runtime.to_string(), "Division by zero");
}

#[test]
fn arithmetic_and_promotion() {
    assert_eq!(render("{6 * 7} {1 + 2 * 3} {7 % 3}", &Data::new()), "42 7 1");
    assert_eq!(render("{1 / 2}", &Data::new()), "0");
    assert_eq!(render("{1.0 / 2}", &Data::new()), "0.5");
    let mut data = Data::new();
    data.assign("n", 20);
    assert_eq!(render("{$n * 2 + 2}", &data), "42");
}

#[test]
fn builtin_modifiers() {
    let mut data = Data::new();
    data.assign("name", "John Doe");
    assert_eq!(render("{$name|toupper}", &data), "JOHN DOE");
    assert_eq!(render("{$name|tolower}", &data), "john doe");
    assert_eq!(render("{$name|tolower|toupper}", &data), "JOHN DOE");
}

struct Repeat;

impl Modifier for Repeat {
    fn apply(&self, input: &VariantValue, params: &[VariantValue]) -> VariantValue {
        let count = params.first().map(|p| p.to_numeric()).unwrap_or(1);
        input
            .to_display_string()
            .repeat(count.max(0) as usize)
            .into()
    }
}

#[test]
fn custom_modifier_with_parameters() {
    let mut data = Data::new();
    data.assign("x", "ab");
    data.modifier("repeat", Repeat);
    assert_eq!(render("{$x|repeat:3}", &data), "ababab");
}

#[test]
fn unknown_modifier_passes_through() {
    let mut data = Data::new();
    data.assign("x", "kept");
    assert_eq!(render("{$x|spellcheck}", &data), "kept");
}

#[test]
fn mode_directive_selects_the_escaper() {
    let mut data = Data::new();
    data.assign("x", "<b>&</b>");
    assert_eq!(
        render("{mode html}{$x}", &data),
        "&lt;b&gt;&amp;&lt;/b&gt;"
    );
    // default is raw
    assert_eq!(render("{$x}", &data), "<b>&</b>");
}

#[test]
fn process_encoding_overrides_the_template() {
    let mut data = Data::new();
    data.assign("x", "a&b");
    let template = Template::new("{mode html}{$x}").unwrap();
    assert_eq!(
        template.process_with_encoding(&data, "url").unwrap(),
        "a%26b"
    );
}

#[test]
fn literal_braces_and_literal_blocks() {
    assert_eq!(render("a { b } c", &Data::new()), "a { b } c");
    assert_eq!(
        render("{literal}{$not_a_var}{/literal}", &Data::new()),
        "{$not_a_var}"
    );
}

#[test]
fn nested_foreach_with_shadowed_binding() {
    let mut data = Data::new();
    data.assign("outer", vec![vec![1, 2], vec![3, 4]]);
    let output = render(
        "{foreach $row in $outer}{foreach $cell in $row}{$cell}{/foreach};{/foreach}",
        &data,
    );
    assert_eq!(output, "12;34;");
}

#[test]
fn consecutive_foreach_with_the_same_binding() {
    let mut data = Data::new();
    data.assign("a", vec![1, 2]);
    data.assign("b", vec![3, 4]);
    let output = render(
        "{foreach $x in $a}{$x}{/foreach}{foreach $x in $b}{$x}{/foreach}",
        &data,
    );
    assert_eq!(output, "1234");
}

#[test]
fn short_circuit_skips_the_right_operand() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static CALLS: AtomicUsize = AtomicUsize::new(0);

    let mut data = Data::new();
    data.callback(
        "expensive",
        || {
            CALLS.fetch_add(1, Ordering::SeqCst);
            VariantValue::from(true)
        },
        false,
    );
    assert_eq!(render("{if true || $expensive}y{/if}", &data), "y");
    assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    assert_eq!(render("{if false && $expensive}y{else}n{/if}", &data), "n");
    assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    assert_eq!(render("{if false || $expensive}y{/if}", &data), "y");
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
}

#[test]
fn callback_variables() {
    let mut data = Data::new();
    data.callback("greeting", || VariantValue::from("hello"), true);
    assert_eq!(render("{$greeting} {$greeting}", &data), "hello hello");
}

#[derive(Debug)]
struct Temperature(f64);

impl tarragon::CustomValue for Temperature {
    fn render(&self) -> String {
        format!("{}C", self.0)
    }

    fn to_double(&self) -> f64 {
        self.0
    }

    fn to_boolean(&self) -> bool {
        true
    }
}

#[test]
fn custom_values_render_and_compare() {
    let mut data = Data::new();
    data.assign("temp", VariantValue::custom(Temperature(21.5)));
    assert_eq!(render("{$temp}", &data), "21.5C");
    assert_eq!(render("{if $temp > 20.0}warm{/if}", &data), "warm");
}

#[test]
fn rendering_is_deterministic() {
    let mut data = Data::new();
    data.assign("list", list_0_to_4());
    let template = Template::new("{foreach $i in $list}{$i}{/foreach}").unwrap();
    let first = template.process(&data).unwrap();
    let second = template.process(&data).unwrap();
    assert_eq!(first, second);
}

#[test]
fn non_personalized_output_ignores_the_data() {
    let template = Template::new("{if 1 == 1}constant{/if} {1 + 1}").unwrap();
    assert!(!template.personalized());

    let mut data = Data::new();
    data.assign("anything", "whatever");
    assert_eq!(
        template.process(&Data::new()).unwrap(),
        template.process(&data).unwrap()
    );
}

#[test]
fn equality_and_inequality_are_exclusive() {
    for template in ["{if 1 == 2}a{/if}{if 1 != 2}b{/if}", "{if \"x\" == \"x\"}b{/if}{if \"x\" != \"x\"}a{/if}"] {
        assert_eq!(render(template, &Data::new()), "b");
    }
}

#[test]
fn compiled_c_source_matches_the_template() {
    let template = Template::new("{foreach $item in $list}item: {$item}\n{/foreach}").unwrap();
    let c_source = template.compile().unwrap();
    assert!(c_source.contains("void show_template"));
    assert!(c_source.contains("unsigned char personalized = 1;"));
    assert!(c_source.contains("member_iter"));
    assert!(c_source.contains("\"item: \""));
}

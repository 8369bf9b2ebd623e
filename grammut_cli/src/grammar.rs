use grammut_core::grammar::{GrammarError, RuleGrammar, RulePart};

fn lit(text: &str) -> RulePart {
    RulePart::literal(text)
}

fn sym(name: &str) -> RulePart {
    RulePart::symbol(name)
}

/// A small statement language used to exercise the mutator.
pub fn expression_grammar() -> Result<RuleGrammar, GrammarError> {
    let mut builder = RuleGrammar::builder();
    builder
        .rule("root", [sym("statements")])
        .repeat("statements", "statement")
        .rule("statement", [sym("ident"), lit(" = "), sym("expr"), lit(";\n")])
        .rule("statement", [lit("print("), sym("expr"), lit(");\n")])
        .rule("expr", [sym("term")])
        .rule("expr", [sym("term"), sym("addop"), sym("expr")])
        .rule("term", [sym("factor")])
        .rule("term", [sym("factor"), lit(" * "), sym("factor")])
        .rule("factor", [sym("number")])
        .rule("factor", [sym("ident")])
        .rule("factor", [lit("-"), sym("number")])
        .rule("factor", [sym("ident"), lit("["), sym("number"), lit("]")])
        .rule("factor", [lit("("), sym("expr"), lit(")")])
        .literals("addop", [" + ", " - "])
        .repeat("number", "digit")
        .literals("digit", ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"])
        .literals("ident", ["x", "y", "z", "acc"]);
    builder.build()
}

use mlr_core::Span;

use crate::ast::*;
use crate::build::build_program;
use crate::cst::Stmt;

fn span() -> Span {
    Span::new(0, 1)
}

#[test]
fn break_outside_loop_is_rejected() {
    let ast = AstProgram {
        items: vec![AstTopLevel::Main(AstStmt::Break(span()))],
    };
    let err = build_program(ast, false).unwrap_err();
    assert!(matches!(err, crate::CstError::Invalid(_)));
}

#[test]
fn break_inside_loop_is_accepted() {
    let ast = AstProgram {
        items: vec![AstTopLevel::Main(AstStmt::While {
            cond: AstExpr::BoolLit(true),
            body: vec![AstStmt::Break(span())],
            span: span(),
        })],
    };
    assert!(build_program(ast, false).is_ok());
}

#[test]
fn return_value_outside_func_is_rejected() {
    let ast = AstProgram {
        items: vec![AstTopLevel::Main(AstStmt::ReturnValue(AstExpr::IntLit(1), span()))],
    };
    assert!(build_program(ast, false).is_err());
}

#[test]
fn return_value_inside_func_is_accepted() {
    let ast = AstProgram {
        items: vec![AstTopLevel::Func(AstFuncDef {
            name: "f".to_string(),
            params: vec![],
            return_mask: Some(TypeMaskSpec::Int),
            body: vec![AstStmt::ReturnValue(AstExpr::IntLit(1), span())],
            span: span(),
        })],
    };
    assert!(build_program(ast, false).is_ok());
}

#[test]
fn duplicate_function_definitions_are_rejected() {
    let def = || AstFuncDef {
        name: "f".to_string(),
        params: vec![],
        return_mask: None,
        body: vec![AstStmt::ReturnVoid(span())],
        span: span(),
    };
    let ast = AstProgram {
        items: vec![AstTopLevel::Subr(def()), AstTopLevel::Subr(def())],
    };
    assert!(build_program(ast, false).is_err());
}

#[test]
fn field_access_in_begin_block_is_rejected() {
    let ast = AstProgram {
        items: vec![AstTopLevel::Begin {
            body: vec![AstStmt::SrecAssign {
                name: "x".to_string(),
                value: AstExpr::IntLit(1),
                span: span(),
            }],
            span: span(),
        }],
    };
    assert!(build_program(ast, false).is_err());
}

#[test]
fn filter_program_requires_bare_bool_tail() {
    let ast = AstProgram {
        items: vec![AstTopLevel::Main(AstStmt::SrecAssign {
            name: "x".to_string(),
            value: AstExpr::IntLit(1),
            span: span(),
        })],
    };
    assert!(build_program(ast, true).is_err());

    let ast_ok = AstProgram {
        items: vec![AstTopLevel::Main(AstStmt::BareBool(AstExpr::BoolLit(true), span()))],
    };
    let (program, _) = build_program(ast_ok, true).unwrap();
    assert!(program.is_filter);
}

#[test]
fn block_subframe_len_matches_declared_locals() {
    let ast = AstProgram {
        items: vec![AstTopLevel::Main(AstStmt::While {
            cond: AstExpr::BoolLit(true),
            body: vec![
                AstStmt::LocalDecl {
                    name: "a".to_string(),
                    type_mask: TypeMaskSpec::Int,
                    value: Some(AstExpr::IntLit(1)),
                    span: span(),
                },
                AstStmt::LocalDecl {
                    name: "b".to_string(),
                    type_mask: TypeMaskSpec::Int,
                    value: Some(AstExpr::IntLit(2)),
                    span: span(),
                },
            ],
            span: span(),
        })],
    };
    let (program, _) = build_program(ast, false).unwrap();
    match &program.main_block.stmts[0] {
        Stmt::While { body, .. } => assert_eq!(body.subframe_len, 2),
        _ => panic!("expected a while statement"),
    }
}

#[test]
fn duplicate_for_loop_binder_names_are_rejected() {
    let ast = AstProgram {
        items: vec![AstTopLevel::Main(AstStmt::ForSrec {
            key_name: Some("k".to_string()),
            val_name: "k".to_string(),
            body: vec![],
            span: span(),
        })],
    };
    assert!(build_program(ast, false).is_err());
}

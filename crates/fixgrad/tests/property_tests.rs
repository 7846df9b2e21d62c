// Property tests for the algebraic laws of tensors and their gradients.

use fixgrad::prelude::*;
use proptest::collection::vec;
use proptest::prelude::*;

type I34 = Tensor<i64, Rank2<3, 4>>;
type F23 = Tensor<f64, Rank2<2, 3>>;

fn int_tensor<S: Shape>(values: &[i64]) -> Tensor<i64, S> {
    Tensor::try_from(values).unwrap()
}

fn float_tensor<S: Shape>(values: &[f64]) -> Tensor<f64, S> {
    Tensor::try_from(values).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_add_then_sub_is_identity(a in vec(-1000i64..1000, 12), b in vec(-1000i64..1000, 12)) {
        let a: I34 = int_tensor(&a);
        let b: I34 = int_tensor(&b);
        prop_assert_eq!(&(&a + &b) - &b, a);
    }

    #[test]
    fn prop_identity_is_neutral(a in vec(-1000i64..1000, 16)) {
        let a: Tensor<i64, Rank2<4, 4>> = int_tensor(&a);
        prop_assert_eq!(a.matmul(&Tensor::<i64, Rank2<4, 4>>::eye()), a);
    }

    #[test]
    fn prop_view_round_trip(a in vec(-1000i64..1000, 12)) {
        let t: I34 = int_tensor(&a);
        let back = t.view::<Rank3<2, 3, 2>>().view::<Rank2<3, 4>>();
        prop_assert_eq!(back, &t);
        let flat = t.reshape::<Rank1<12>>();
        prop_assert_eq!(flat.as_slice(), a.as_slice());
    }

    #[test]
    fn prop_double_transpose(a in vec(-1000i64..1000, 12)) {
        let t: I34 = int_tensor(&a);
        prop_assert_eq!(t.t().t(), t);
    }

    #[test]
    fn prop_sum_grad_is_ones(a in vec(-100.0f64..100.0, 6)) {
        let v = Variable::leaf(float_tensor::<Rank2<2, 3>>(&a));
        v.sum().backward();
        prop_assert_eq!(&*v.grad(), &F23::ones());
    }

    #[test]
    fn prop_mul_grads_swap(a in vec(-100.0f64..100.0, 6), b in vec(-100.0f64..100.0, 6)) {
        let va = Variable::leaf(float_tensor::<Rank2<2, 3>>(&a));
        let vb = Variable::leaf(float_tensor::<Rank2<2, 3>>(&b));
        (&va * &vb).sum().backward();
        prop_assert_eq!(&*va.grad(), &*vb.value());
        prop_assert_eq!(&*vb.grad(), &*va.value());
    }

    #[test]
    fn prop_self_add_grad_is_two(a in vec(-100.0f64..100.0, 6)) {
        let v = Variable::leaf(float_tensor::<Rank2<2, 3>>(&a));
        (&v + &v).sum().backward();
        prop_assert_eq!(&*v.grad(), &F23::full(2.0));
    }

    #[test]
    fn prop_constant_grad_stays_zero(a in vec(-10.0f64..10.0, 6), b in vec(-10.0f64..10.0, 6)) {
        let va = Variable::leaf(float_tensor::<Rank2<2, 3>>(&a));
        let vb = Variable::constant(float_tensor::<Rank2<2, 3>>(&b));
        ((&va * &vb).tanh() - &vb).sum().backward();
        prop_assert_eq!(&*vb.grad(), &F23::zeros());
    }

    #[test]
    fn prop_stack_split_round_trip(a in vec(-1000i64..1000, 6), b in vec(-1000i64..1000, 9)) {
        let ta: Tensor<i64, Rank2<2, 3>> = int_tensor(&a);
        let tb: Tensor<i64, Rank2<3, 3>> = int_tensor(&b);
        let s: Tensor<i64, Rank2<5, 3>> = ta.stack_along::<0, _, _>(&tb);
        let (a2, b2) = s.split_along::<0, Rank2<2, 3>, Rank2<3, 3>>();
        prop_assert_eq!(a2, ta);
        prop_assert_eq!(b2, tb);
    }

    #[test]
    fn prop_log_grad_matches_derivative(a in vec(0.1f64..100.0, 6)) {
        let v = Variable::leaf(float_tensor::<Rank2<2, 3>>(&a));
        v.log().sum().backward();
        let expected = float_tensor::<Rank2<2, 3>>(&a).map(|x| 1.0 / x);
        prop_assert!(all_close(&v.grad(), &expected, 1e-9));
    }
}
